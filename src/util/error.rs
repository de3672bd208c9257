// NetGather - util/error.rs
//
// Typed error hierarchy with context-preserving error chains.
// No string-based error propagation between subsystems.
// All errors preserve the causal chain for diagnostic logging.
//
// Per-target session failures and per-tier extraction reasons are NOT errors:
// they are recoverable data carried in `core::model` and never abort a run.

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Top-level error type for all NetGather operations.
/// Errors are categorised by the subsystem that produced them.
#[derive(Debug)]
pub enum NetGatherError {
    /// A template file could not be loaded or compiled.
    Template(TemplateError),

    /// Template index or bundle handling failed.
    Registry(RegistryError),

    /// The collection run could not be started.
    Collect(CollectError),

    /// Filter operation failed.
    Filter(FilterError),

    /// Export operation failed.
    Export(ExportError),

    /// Configuration loading or validation failed.
    Config(ConfigError),

    /// I/O error with path context.
    Io {
        path: PathBuf,
        operation: &'static str,
        source: io::Error,
    },
}

impl fmt::Display for NetGatherError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Template(e) => write!(f, "Template error: {e}"),
            Self::Registry(e) => write!(f, "Template registry error: {e}"),
            Self::Collect(e) => write!(f, "Collection error: {e}"),
            Self::Filter(e) => write!(f, "Filter error: {e}"),
            Self::Export(e) => write!(f, "Export error: {e}"),
            Self::Config(e) => write!(f, "Configuration error: {e}"),
            Self::Io {
                path,
                operation,
                source,
            } => write!(
                f,
                "I/O error during {operation} on '{}': {source}",
                path.display()
            ),
        }
    }
}

impl std::error::Error for NetGatherError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Template(e) => Some(e),
            Self::Registry(e) => Some(e),
            Self::Collect(e) => Some(e),
            Self::Filter(e) => Some(e),
            Self::Export(e) => Some(e),
            Self::Config(e) => Some(e),
            Self::Io { source, .. } => Some(source),
        }
    }
}

// ---------------------------------------------------------------------------
// Template errors
// ---------------------------------------------------------------------------

/// Errors raised while loading, compiling, or running a parsing template.
#[derive(Debug)]
pub enum TemplateError {
    /// Template file exceeds the maximum allowed size.
    FileTooLarge {
        path: PathBuf,
        size: u64,
        max_size: u64,
    },

    /// The template text is structurally invalid.
    Syntax {
        template: String,
        line_number: usize,
        reason: String,
    },

    /// A value or rule regex failed to compile.
    InvalidRegex {
        template: String,
        line_number: usize,
        pattern: String,
        source: regex::Error,
    },

    /// A regex exceeds the maximum allowed length.
    RegexTooLong {
        template: String,
        line_number: usize,
        length: usize,
        max_length: usize,
    },

    /// A rule with an `Error` action matched while parsing device output.
    Action {
        template: String,
        state: String,
        message: String,
        line: String,
    },

    /// I/O error reading a template file.
    Io { path: PathBuf, source: io::Error },
}

impl fmt::Display for TemplateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FileTooLarge {
                path,
                size,
                max_size,
            } => write!(
                f,
                "Template '{}' is {size} bytes, exceeds maximum of {max_size} bytes",
                path.display()
            ),
            Self::Syntax {
                template,
                line_number,
                reason,
            } => write!(f, "Template '{template}' line {line_number}: {reason}"),
            Self::InvalidRegex {
                template,
                line_number,
                pattern,
                source,
            } => write!(
                f,
                "Template '{template}' line {line_number}: invalid regex '{pattern}': {source}"
            ),
            Self::RegexTooLong {
                template,
                line_number,
                length,
                max_length,
            } => write!(
                f,
                "Template '{template}' line {line_number}: regex is {length} chars, \
                 exceeds maximum of {max_length}"
            ),
            Self::Action {
                template,
                state,
                message,
                line,
            } => write!(
                f,
                "Template '{template}' raised an error in state '{state}': {message} (line: '{line}')"
            ),
            Self::Io { path, source } => {
                write!(
                    f,
                    "I/O error reading template '{}': {source}",
                    path.display()
                )
            }
        }
    }
}

impl std::error::Error for TemplateError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InvalidRegex { source, .. } => Some(source),
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<TemplateError> for NetGatherError {
    fn from(e: TemplateError) -> Self {
        Self::Template(e)
    }
}

// ---------------------------------------------------------------------------
// Registry errors
// ---------------------------------------------------------------------------

/// Errors related to template directories, index files, and bundles.
#[derive(Debug)]
pub enum RegistryError {
    /// The template directory does not exist or is not a directory.
    NotADirectory { path: PathBuf },

    /// The template directory has no index file.
    IndexMissing { dir: PathBuf },

    /// A row of the index file is malformed.
    IndexParse {
        path: PathBuf,
        line_number: usize,
        reason: String,
    },

    /// A Platform or Command cell of the index is not a valid regex.
    IndexRegex {
        path: PathBuf,
        line_number: usize,
        pattern: String,
        source: regex::Error,
    },

    /// A bundle contained no directory with an index file.
    BundleNoIndex { path: PathBuf },

    /// A bundle archive could not be read or unpacked.
    BundleArchive {
        path: PathBuf,
        source: zip::result::ZipError,
    },

    /// Walkdir traversal error while searching a bundle or catalog.
    Traversal {
        path: PathBuf,
        source: walkdir::Error,
    },

    /// I/O error with path context.
    Io {
        path: PathBuf,
        operation: &'static str,
        source: io::Error,
    },
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotADirectory { path } => {
                write!(f, "Template path '{}' is not a directory", path.display())
            }
            Self::IndexMissing { dir } => {
                write!(f, "No 'index' file found in '{}'", dir.display())
            }
            Self::IndexParse {
                path,
                line_number,
                reason,
            } => write!(f, "'{}' line {line_number}: {reason}", path.display()),
            Self::IndexRegex {
                path,
                line_number,
                pattern,
                source,
            } => write!(
                f,
                "'{}' line {line_number}: invalid pattern '{pattern}': {source}",
                path.display()
            ),
            Self::BundleNoIndex { path } => write!(
                f,
                "No 'index' file found inside the bundle '{}'",
                path.display()
            ),
            Self::BundleArchive { path, source } => {
                write!(f, "Failed to load bundle '{}': {source}", path.display())
            }
            Self::Traversal { path, source } => {
                write!(f, "Error traversing '{}': {source}", path.display())
            }
            Self::Io {
                path,
                operation,
                source,
            } => write!(
                f,
                "I/O error during {operation} on '{}': {source}",
                path.display()
            ),
        }
    }
}

impl std::error::Error for RegistryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::IndexRegex { source, .. } => Some(source),
            Self::BundleArchive { source, .. } => Some(source),
            Self::Traversal { source, .. } => Some(source),
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<RegistryError> for NetGatherError {
    fn from(e: RegistryError) -> Self {
        Self::Registry(e)
    }
}

// ---------------------------------------------------------------------------
// Collection errors
// ---------------------------------------------------------------------------

/// Errors that prevent a collection run from starting at all.
///
/// Once a run has started nothing is fatal: every target produces a result.
#[derive(Debug)]
pub enum CollectError {
    /// The target list was empty after parsing.
    NoTargets,

    /// The command to run was empty.
    EmptyCommand,

    /// The worker pool could not be created.
    PoolBuild { source: rayon::ThreadPoolBuildError },
}

impl fmt::Display for CollectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoTargets => write!(f, "No hosts found in the target list"),
            Self::EmptyCommand => write!(f, "The command to run is empty"),
            Self::PoolBuild { source } => write!(f, "Failed to start worker pool: {source}"),
        }
    }
}

impl std::error::Error for CollectError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::PoolBuild { source } => Some(source),
            _ => None,
        }
    }
}

impl From<CollectError> for NetGatherError {
    fn from(e: CollectError) -> Self {
        Self::Collect(e)
    }
}

// ---------------------------------------------------------------------------
// Filter errors
// ---------------------------------------------------------------------------

/// Errors related to filter operations.
#[derive(Debug)]
pub enum FilterError {
    /// User-provided regex is invalid.
    InvalidRegex {
        pattern: String,
        source: regex::Error,
    },
}

impl fmt::Display for FilterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidRegex { pattern, source } => {
                write!(f, "Invalid regex '{pattern}': {source}")
            }
        }
    }
}

impl std::error::Error for FilterError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InvalidRegex { source, .. } => Some(source),
        }
    }
}

impl From<FilterError> for NetGatherError {
    fn from(e: FilterError) -> Self {
        Self::Filter(e)
    }
}

// ---------------------------------------------------------------------------
// Export errors
// ---------------------------------------------------------------------------

/// Errors related to export operations.
#[derive(Debug)]
pub enum ExportError {
    /// I/O error writing the export file.
    Io { path: PathBuf, source: io::Error },

    /// CSV serialisation error.
    Csv { path: PathBuf, source: csv::Error },

    /// JSON serialisation error.
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// Export would exceed maximum row count.
    TooManyRows { count: usize, max: usize },
}

impl fmt::Display for ExportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "Export I/O error '{}': {source}", path.display())
            }
            Self::Csv { path, source } => {
                write!(f, "CSV export error '{}': {source}", path.display())
            }
            Self::Json { path, source } => {
                write!(f, "JSON export error '{}': {source}", path.display())
            }
            Self::TooManyRows { count, max } => write!(
                f,
                "Export of {count} rows exceeds maximum of {max}. \
                 Apply filters to reduce the result set."
            ),
        }
    }
}

impl std::error::Error for ExportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Csv { source, .. } => Some(source),
            Self::Json { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<ExportError> for NetGatherError {
    fn from(e: ExportError) -> Self {
        Self::Export(e)
    }
}

// ---------------------------------------------------------------------------
// Config errors
// ---------------------------------------------------------------------------

/// Errors related to configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    /// TOML parsing failed.
    TomlParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// A config value is out of the allowed range.
    ValueOutOfRange {
        field: String,
        value: String,
        expected: String,
    },

    /// I/O error reading config file.
    Io { path: PathBuf, source: io::Error },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TomlParse { path, source } => {
                write!(f, "Config parse error '{}': {source}", path.display())
            }
            Self::ValueOutOfRange {
                field,
                value,
                expected,
            } => write!(
                f,
                "Config '{field}' = '{value}' is out of range. Expected: {expected}"
            ),
            Self::Io { path, source } => {
                write!(f, "Config I/O error '{}': {source}", path.display())
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::TomlParse { source, .. } => Some(source),
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<ConfigError> for NetGatherError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

/// Convenience type alias for NetGather results.
pub type Result<T> = std::result::Result<T, NetGatherError>;
