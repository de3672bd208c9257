// NetGather - core/registry.rs
//
// Template registry: maps (platform, command) to a compiled template.
//
// The active source is a directory holding an `index` file plus the
// template files it names. A registry handle is cheap to clone; every clone
// shares the same active index. Replacing the source swaps one `Arc` under
// a write lock, so lookups that already hold the previous index finish
// against it while later lookups see the new one.

use crate::core::model::ExtractionReason;
use crate::core::template::Template;
use crate::util::constants;
use crate::util::error::{RegistryError, TemplateError};
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

// =============================================================================
// Index
// =============================================================================

/// One data row of an index file.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    /// Template file names; only the first is used for parsing.
    pub files: Vec<String>,
    pub platform_pattern: String,
    pub command_pattern: String,
    platform: Regex,
    command: Regex,
    pub line_number: usize,
}

impl IndexEntry {
    fn matches(&self, platform: &str, command: &str) -> bool {
        self.platform.is_match(platform) && self.command.is_match(command)
    }

    /// The template file this row selects.
    pub fn primary_file(&self) -> &str {
        self.files.first().map(String::as_str).unwrap_or_default()
    }
}

/// A parsed index plus the directory its template files live in.
///
/// Templates are compiled on first use and cached for the life of the index.
#[derive(Debug)]
pub struct TemplateIndex {
    dir: PathBuf,
    entries: Vec<IndexEntry>,
    cache: Mutex<HashMap<String, Arc<Template>>>,
}

impl TemplateIndex {
    /// Load `<dir>/index`.
    pub fn load(dir: &Path) -> Result<Self, RegistryError> {
        if !dir.is_dir() {
            return Err(RegistryError::NotADirectory {
                path: dir.to_path_buf(),
            });
        }
        let index_path = dir.join(constants::TEMPLATE_INDEX_FILE);
        if !index_path.is_file() {
            return Err(RegistryError::IndexMissing {
                dir: dir.to_path_buf(),
            });
        }
        let text = fs::read_to_string(&index_path).map_err(|e| RegistryError::Io {
            path: index_path.clone(),
            operation: "read index",
            source: e,
        })?;
        let entries = parse_index(&index_path, &text)?;

        tracing::info!(
            dir = %dir.display(),
            entries = entries.len(),
            "Template index loaded"
        );
        Ok(Self {
            dir: dir.to_path_buf(),
            entries,
            cache: Mutex::new(HashMap::new()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// First row whose Platform and Command both match.
    pub fn find(&self, platform: &str, command: &str) -> Option<&IndexEntry> {
        self.entries.iter().find(|e| e.matches(platform, command))
    }

    /// Compile (or fetch from cache) the template a row selects.
    pub fn template(&self, entry: &IndexEntry) -> Result<Arc<Template>, TemplateError> {
        let file = entry.primary_file();
        {
            let cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(template) = cache.get(file) {
                return Ok(Arc::clone(template));
            }
        }

        let template = Arc::new(load_template_file(&self.dir.join(file))?);
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(file.to_string(), Arc::clone(&template));
        Ok(template)
    }
}

/// Read and compile one template file, enforcing the size limit.
pub fn load_template_file(path: &Path) -> Result<Template, TemplateError> {
    let metadata = fs::metadata(path).map_err(|e| TemplateError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    if metadata.len() > constants::MAX_TEMPLATE_FILE_SIZE {
        return Err(TemplateError::FileTooLarge {
            path: path.to_path_buf(),
            size: metadata.len(),
            max_size: constants::MAX_TEMPLATE_FILE_SIZE,
        });
    }
    let text = fs::read_to_string(path).map_err(|e| TemplateError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    Template::parse(&name, &text)
}

/// Parse index text. `path` is used for error context only.
///
/// The first non-comment row is the header; `Template` and `Command`
/// columns are required, `Platform` is optional (absent = any platform),
/// and other columns such as `Hostname` are ignored.
pub fn parse_index(path: &Path, text: &str) -> Result<Vec<IndexEntry>, RegistryError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .comment(Some(b'#'))
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(text.as_bytes());

    let parse_err = |line_number: usize, reason: String| RegistryError::IndexParse {
        path: path.to_path_buf(),
        line_number,
        reason,
    };

    let headers = reader
        .headers()
        .map_err(|e| parse_err(1, e.to_string()))?
        .clone();
    let column = |name: &str| headers.iter().position(|h| h == name);
    let template_col = column("Template")
        .ok_or_else(|| parse_err(1, "missing 'Template' column".to_string()))?;
    let command_col = column("Command")
        .ok_or_else(|| parse_err(1, "missing 'Command' column".to_string()))?;
    let platform_col = column("Platform");

    let mut entries = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| {
            let line = e.position().map(|p| p.line() as usize).unwrap_or(0);
            parse_err(line, e.to_string())
        })?;
        let line_number = record.position().map(|p| p.line() as usize).unwrap_or(0);

        let files: Vec<String> = record
            .get(template_col)
            .unwrap_or_default()
            .split(':')
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .map(str::to_string)
            .collect();
        if files.is_empty() {
            return Err(parse_err(line_number, "empty 'Template' cell".to_string()));
        }

        let platform_pattern = platform_col
            .and_then(|c| record.get(c))
            .filter(|p| !p.is_empty())
            .unwrap_or(".*")
            .to_string();
        let command_pattern = record.get(command_col).unwrap_or_default().to_string();
        if command_pattern.is_empty() {
            return Err(parse_err(line_number, "empty 'Command' cell".to_string()));
        }

        let platform = compile_cell(path, line_number, &platform_pattern)?;
        let command = compile_cell(path, line_number, &expand_completion(&command_pattern))?;

        entries.push(IndexEntry {
            files,
            platform_pattern,
            command_pattern,
            platform,
            command,
            line_number,
        });
    }
    Ok(entries)
}

/// Expand `[[...]]` completion markers into optional nested groups:
/// `sh[[ow]]` becomes `sh(o(w)?)?`.
pub fn expand_completion(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() * 2);
    let mut rest = pattern;
    while let Some(start) = rest.find("[[") {
        let Some(len) = rest[start + 2..].find("]]") else {
            break;
        };
        out.push_str(&rest[..start]);
        let optional = &rest[start + 2..start + 2 + len];
        for c in optional.chars() {
            out.push('(');
            out.push(c);
        }
        for _ in optional.chars() {
            out.push_str(")?");
        }
        rest = &rest[start + 2 + len + 2..];
    }
    out.push_str(rest);
    out
}

fn compile_cell(path: &Path, line_number: usize, pattern: &str) -> Result<Regex, RegistryError> {
    Regex::new(&format!("^(?:{pattern})$")).map_err(|e| RegistryError::IndexRegex {
        path: path.to_path_buf(),
        line_number,
        pattern: pattern.to_string(),
        source: e,
    })
}

// =============================================================================
// Registry handle
// =============================================================================

/// A successful lookup.
#[derive(Debug, Clone)]
pub struct ResolvedTemplate {
    pub platform: String,
    pub command: String,
    pub path: PathBuf,
    pub template: Arc<Template>,
}

/// One row of the template catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogEntry {
    pub template_file: String,
    pub platform: String,
    pub command: String,
    /// Containing folder relative to the template directory (`.` for the root).
    pub folder: String,
}

/// Shared handle to the active template source.
#[derive(Debug, Clone, Default)]
pub struct TemplateRegistry {
    active: Arc<RwLock<Option<Arc<TemplateIndex>>>>,
}

/// Map a target type to the platform name used by the index.
///
/// Unknown types pass through unchanged.
pub fn resolve_platform(device_type: &str) -> &str {
    constants::PLATFORM_ALIASES
        .iter()
        .find(|(alias, _)| *alias == device_type)
        .map(|(_, platform)| *platform)
        .unwrap_or(device_type)
}

impl TemplateRegistry {
    /// A registry with no active source.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry whose source is `dir`.
    pub fn from_dir(dir: &Path) -> Result<Self, RegistryError> {
        let registry = Self::new();
        registry.set_directory(dir)?;
        Ok(registry)
    }

    /// Make `dir` the active source. On error the previous source stays.
    pub fn set_directory(&self, dir: &Path) -> Result<PathBuf, RegistryError> {
        let index = Arc::new(TemplateIndex::load(dir)?);
        self.install(index);
        Ok(dir.to_path_buf())
    }

    /// Load a user-supplied bundle: a zip archive or an unpacked directory.
    ///
    /// The shallowest directory inside it that contains an `index` file
    /// becomes the active source, and its path is returned.
    pub fn load_bundle(&self, path: &Path) -> Result<PathBuf, RegistryError> {
        self.load_bundle_in(path, &std::env::temp_dir())
    }

    /// `load_bundle`, unpacking archives under `scratch`.
    fn load_bundle_in(&self, path: &Path, scratch: &Path) -> Result<PathBuf, RegistryError> {
        if path.is_dir() {
            return self.activate_bundle(path, path);
        }
        // The guard removes the unpacked tree if no usable index is found.
        let unpacked = unpack_archive(path, scratch)?;
        let chosen = self.activate_bundle(path, unpacked.path())?;
        // Template files are read lazily, so the tree must outlive this call.
        let dir = unpacked.keep();
        tracing::debug!(bundle = %path.display(), dir = %dir.display(), "Bundle directory kept");
        Ok(chosen)
    }

    fn activate_bundle(&self, bundle: &Path, root: &Path) -> Result<PathBuf, RegistryError> {
        let chosen = find_index_dir(root)?.ok_or_else(|| RegistryError::BundleNoIndex {
            path: bundle.to_path_buf(),
        })?;
        tracing::info!(
            bundle = %bundle.display(),
            chosen = %chosen.display(),
            "Template bundle loaded"
        );
        self.set_directory(&chosen)
    }

    fn install(&self, index: Arc<TemplateIndex>) {
        let mut active = self.active.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(ref previous) = *active {
            tracing::debug!(
                previous = %previous.dir().display(),
                next = %index.dir().display(),
                "Replacing active template index"
            );
        }
        *active = Some(index);
    }

    /// The index in effect right now. Holding it pins that source even if
    /// the registry is switched afterwards.
    pub fn snapshot(&self) -> Option<Arc<TemplateIndex>> {
        self.active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn active_dir(&self) -> Option<PathBuf> {
        self.snapshot().map(|index| index.dir().to_path_buf())
    }

    /// Resolve a template for `device_type` and the exact `command` text.
    pub fn lookup(
        &self,
        device_type: &str,
        command: &str,
    ) -> Result<ResolvedTemplate, ExtractionReason> {
        let index = self.snapshot().ok_or(ExtractionReason::NoTemplateDirectory)?;
        lookup_in(&index, device_type, command)
    }

    /// Whether an index row matches, without compiling the template.
    pub fn has_template(&self, device_type: &str, command: &str) -> bool {
        self.snapshot().is_some_and(|index| {
            index
                .find(resolve_platform(device_type), command.trim())
                .is_some()
        })
    }

    /// List every template file under the active directory, sorted by path.
    pub fn catalog(&self) -> Result<Vec<CatalogEntry>, RegistryError> {
        match self.snapshot() {
            Some(index) => scan_catalog(index.dir()),
            None => Ok(Vec::new()),
        }
    }
}

/// Lookup against one pinned index.
pub fn lookup_in(
    index: &TemplateIndex,
    device_type: &str,
    command: &str,
) -> Result<ResolvedTemplate, ExtractionReason> {
    let platform = resolve_platform(device_type);
    let command = command.trim();

    let entry = index
        .find(platform, command)
        .ok_or_else(|| ExtractionReason::TemplateNotFound {
            platform: platform.to_string(),
            command: command.to_string(),
        })?;
    let template = index
        .template(entry)
        .map_err(|e| ExtractionReason::TemplateError {
            message: e.to_string(),
        })?;

    tracing::debug!(
        platform,
        command,
        template = entry.primary_file(),
        "Template resolved"
    );
    Ok(ResolvedTemplate {
        platform: platform.to_string(),
        command: command.to_string(),
        path: index.dir().join(entry.primary_file()),
        template,
    })
}

// =============================================================================
// Bundles and catalog
// =============================================================================

fn unpack_archive(path: &Path, scratch: &Path) -> Result<tempfile::TempDir, RegistryError> {
    let file = fs::File::open(path).map_err(|e| RegistryError::Io {
        path: path.to_path_buf(),
        operation: "open bundle",
        source: e,
    })?;
    let mut archive = zip::ZipArchive::new(file).map_err(|e| RegistryError::BundleArchive {
        path: path.to_path_buf(),
        source: e,
    })?;

    let dir = tempfile::Builder::new()
        .prefix(constants::BUNDLE_TEMP_PREFIX)
        .tempdir_in(scratch)
        .map_err(|e| RegistryError::Io {
            path: scratch.to_path_buf(),
            operation: "create bundle directory",
            source: e,
        })?;

    archive
        .extract(dir.path())
        .map_err(|e| RegistryError::BundleArchive {
            path: path.to_path_buf(),
            source: e,
        })?;
    tracing::debug!(bundle = %path.display(), dir = %dir.path().display(), "Bundle unpacked");
    Ok(dir)
}

/// The directory under `root` containing an `index` file with the shortest
/// path, or `None`.
pub fn find_index_dir(root: &Path) -> Result<Option<PathBuf>, RegistryError> {
    let mut best: Option<PathBuf> = None;
    for entry in walkdir::WalkDir::new(root).follow_links(false) {
        let entry = entry.map_err(|e| RegistryError::Traversal {
            path: root.to_path_buf(),
            source: e,
        })?;
        if !entry.file_type().is_file() || entry.file_name() != constants::TEMPLATE_INDEX_FILE {
            continue;
        }
        let Some(parent) = entry.path().parent() else {
            continue;
        };
        let shorter = best
            .as_ref()
            .map_or(true, |b| parent.as_os_str().len() < b.as_os_str().len());
        if shorter {
            best = Some(parent.to_path_buf());
        }
    }
    Ok(best)
}

/// Walk `dir` for template files and infer their platform and command.
pub fn scan_catalog(dir: &Path) -> Result<Vec<CatalogEntry>, RegistryError> {
    let suffix = format!(".{}", constants::TEMPLATE_FILE_EXTENSION);
    let mut entries = Vec::new();

    let walker = walkdir::WalkDir::new(dir)
        .follow_links(false)
        .sort_by_file_name();
    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::debug!(error = %e, "Skipping unreadable catalog entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let file_name = entry.file_name().to_string_lossy().into_owned();
        if !file_name.to_lowercase().ends_with(&suffix) {
            continue;
        }

        let folder = entry
            .path()
            .parent()
            .and_then(|p| p.strip_prefix(dir).ok())
            .map(|p| p.to_string_lossy().into_owned())
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| ".".to_string());
        let (platform, command) = infer_platform_command(&file_name);
        entries.push(CatalogEntry {
            template_file: file_name,
            platform,
            command,
            folder,
        });
    }
    Ok(entries)
}

/// Infer (platform, command) from names like
/// `cisco_ios_show_ip_interface_brief.textfsm`.
pub fn infer_platform_command(file_name: &str) -> (String, String) {
    let suffix = format!(".{}", constants::TEMPLATE_FILE_EXTENSION);
    let stem = file_name.strip_suffix(&suffix).unwrap_or(file_name);
    let lower = stem.to_lowercase();

    let (platform, command) = if let Some(idx) = lower.find("_show_") {
        (lower[..idx].to_string(), lower[idx + 1..].to_string())
    } else {
        match lower.split_once('_') {
            Some((platform, rest)) => (platform.to_string(), rest.to_string()),
            None => (stem.to_string(), String::new()),
        }
    };
    (platform, command.replace('_', " ").trim().to_string())
}
