// NetGather - util/constants.rs
//
// Single source of truth for all named constants, limits, and defaults.
// Config validation and CLI defaults both reference these values.

// =============================================================================
// Application metadata
// =============================================================================

/// Application display name.
pub const APP_NAME: &str = "NetGather";

/// Application identifier used for config/data directories.
pub const APP_ID: &str = "NetGather";

/// Current application version (updated by release script).
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

// =============================================================================
// Collection limits
// =============================================================================

/// Default number of targets contacted concurrently.
pub const DEFAULT_WORKERS: usize = 30;

/// Minimum worker count (the pool always has at least one thread).
pub const MIN_WORKERS: usize = 1;

/// Hard upper bound on concurrent sessions.
pub const MAX_WORKERS: usize = 500;

/// Default per-target session timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 25;

/// Minimum configurable per-target timeout in seconds.
pub const MIN_TIMEOUT_SECS: u64 = 5;

/// Maximum configurable per-target timeout in seconds.
pub const MAX_TIMEOUT_SECS: u64 = 240;

/// Timeout applied to the paging-disable priming command.
pub const PAGING_TIMEOUT_SECS: u64 = 5;

/// Command sent to disable output paging before the target command.
pub const DISABLE_PAGING_COMMAND: &str = "terminal length 0";

/// Default target type when none is configured.
pub const DEFAULT_DEVICE_TYPE: &str = "cisco_ios";

/// Environment variable the CLI reads the session password from.
pub const PASSWORD_ENV_VAR: &str = "NETGATHER_PASSWORD";

// =============================================================================
// Session provider (system OpenSSH client)
// =============================================================================

/// Default ssh client program.
pub const DEFAULT_SSH_PROGRAM: &str = "ssh";

/// Password helper used when a password is supplied.
pub const DEFAULT_SSHPASS_PROGRAM: &str = "sshpass";

/// Default ssh port.
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Interval at which a running ssh child is polled for exit (ms).
pub const CHILD_POLL_INTERVAL_MS: u64 = 50;

/// Exit status the OpenSSH client uses for its own (transport) errors.
pub const SSH_TRANSPORT_EXIT_CODE: i32 = 255;

// =============================================================================
// Templates
// =============================================================================

/// File name of the template index inside a template directory.
pub const TEMPLATE_INDEX_FILE: &str = "index";

/// Extension of template files listed in the template catalog.
pub const TEMPLATE_FILE_EXTENSION: &str = "textfsm";

/// Prefix for directories that uploaded template bundles are unpacked into.
pub const BUNDLE_TEMP_PREFIX: &str = "textfsm_templates_";

/// Maximum size of a single template file in bytes.
pub const MAX_TEMPLATE_FILE_SIZE: u64 = 256 * 1024; // 256 KB

/// Maximum regex pattern length to prevent ReDoS.
pub const MAX_REGEX_PATTERN_LENGTH: usize = 4_096;

/// Default target-type → template platform aliases.
pub const PLATFORM_ALIASES: &[(&str, &str)] = &[
    ("cisco_ios", "cisco_ios"),
    ("cisco_xe", "cisco_ios"),
    ("cisco_nxos", "cisco_nxos"),
    ("cisco_asa", "cisco_asa"),
    ("arista_eos", "arista_eos"),
    ("juniper_junos", "juniper_junos"),
];

// =============================================================================
// Extraction
// =============================================================================

/// Delimiter keyword selecting "any run of whitespace" splitting.
pub const WHITESPACE_DELIMITER: &str = "whitespace";

/// Separator used when a List value is flattened into a single cell.
pub const LIST_CELL_SEPARATOR: &str = ", ";

/// Column holding the target identifier in every row-set.
pub const COLUMN_HOST: &str = "host";

/// Column holding the 1-based line number in line-oriented row-sets.
pub const COLUMN_LINE_NO: &str = "line_no";

/// Column holding the raw line text in line-oriented row-sets.
pub const COLUMN_LINE: &str = "line";

/// Column holding the capture timestamp in the line view.
pub const COLUMN_TIMESTAMP: &str = "ts";

/// Column holding the failure description in the failure row-set.
pub const COLUMN_ERROR: &str = "error";

// =============================================================================
// Export
// =============================================================================

/// Export file stem for the unfiltered line view.
pub const EXPORT_ALL_LINES: &str = "show_results_all_lines";

/// Export file stem for the filtered line view.
pub const EXPORT_FILTERED_LINES: &str = "show_results_filtered_lines";

/// Export file stem for template-structured rows.
pub const EXPORT_TEMPLATE: &str = "show_results_textfsm_structured";

/// Export file stem for pattern-structured rows.
pub const EXPORT_PATTERN: &str = "show_results_regex_structured";

/// Export file stem for split-column rows.
pub const EXPORT_SPLIT: &str = "show_results_split_columns";

/// Export file stem for the best-available structured view.
pub const EXPORT_BEST: &str = "show_results_structured";

/// Export file stem for per-target failures.
pub const EXPORT_ERRORS: &str = "show_results_errors";

/// Maximum number of rows that can be exported in a single operation.
pub const MAX_EXPORT_ROWS: usize = 5_000_000;

/// Number of rows printed by the CLI when previewing a table.
pub const PREVIEW_ROWS: usize = 20;

// =============================================================================
// Logging
// =============================================================================

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Maximum length of a device output line included in debug output.
pub const DEBUG_MAX_LINE_PREVIEW: usize = 200;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration file name.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Subdirectory of the data directory holding user template sets.
pub const TEMPLATES_DIR_NAME: &str = "templates";
