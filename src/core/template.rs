// NetGather - core/template.rs
//
// Parsing templates in the TextFSM text format: a block of `Value`
// definitions followed by named states holding `^regex -> action` rules.
// A compiled template runs as a line-driven state machine over one
// device's output and produces a table of records.
//
// Core layer: accepts template text and device output as strings, never
// touches the filesystem. The registry feeds file contents here.

use crate::util::constants;
use crate::util::error::TemplateError;
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Reserved state names.
const STATE_START: &str = "Start";
const STATE_EOF: &str = "EOF";
const STATE_END: &str = "End";

/// Maximum length of a value or state name.
const MAX_NAME_LENGTH: usize = 48;

// =============================================================================
// Definitions
// =============================================================================

/// Options that modify how a value behaves across records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValueOptions {
    /// Keep the value across records until it is reassigned.
    pub filldown: bool,
    /// The value is part of the row's identity (informational).
    pub key: bool,
    /// Records with this value empty are discarded.
    pub required: bool,
    /// Every assignment is appended; the cell holds all of them.
    pub list: bool,
    /// An assignment back-fills earlier records where the value is empty.
    pub fillup: bool,
}

impl ValueOptions {
    fn parse(raw: &str, template: &str, line_number: usize) -> Result<Self, TemplateError> {
        let mut options = Self::default();
        for option in raw.split(',') {
            let flag = match option {
                "Filldown" => &mut options.filldown,
                "Key" => &mut options.key,
                "Required" => &mut options.required,
                "List" => &mut options.list,
                "Fillup" => &mut options.fillup,
                other => {
                    return Err(syntax(
                        template,
                        line_number,
                        format!("unknown value option '{other}'"),
                    ))
                }
            };
            if *flag {
                return Err(syntax(
                    template,
                    line_number,
                    format!("duplicate value option '{option}'"),
                ));
            }
            *flag = true;
        }
        Ok(options)
    }
}

/// One `Value` line.
#[derive(Debug, Clone)]
pub struct ValueDef {
    pub name: String,
    pub options: ValueOptions,
    /// The parenthesised regex as written.
    pub pattern: String,
    /// The regex with its outer group turned into a named group, ready for
    /// substitution into rules.
    group_pattern: String,
}

/// What happens to the current input line after a rule matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineOp {
    /// Read the next line (default).
    Next,
    /// Keep matching the same line against the following rules.
    Continue,
    /// Abort parsing with an error.
    Error,
}

/// What happens to the current record after a rule matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOp {
    NoRecord,
    Record,
    Clear,
    Clearall,
}

/// One `^regex -> action` rule.
#[derive(Debug, Clone)]
pub struct Rule {
    regex: Regex,
    line_op: LineOp,
    record_op: RecordOp,
    /// Target state, or the message for an `Error` action.
    new_state: Option<String>,
    line_number: usize,
}

/// A compiled parsing template.
#[derive(Debug, Clone)]
pub struct Template {
    name: String,
    values: Vec<ValueDef>,
    states: HashMap<String, Vec<Rule>>,
}

// =============================================================================
// Parsed output
// =============================================================================

/// A single cell of a parsed record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    List(Vec<String>),
}

impl FieldValue {
    fn is_filled(&self) -> bool {
        match self {
            FieldValue::Text(s) => !s.is_empty(),
            FieldValue::List(items) => !items.is_empty(),
        }
    }

    /// Flatten into a single cell; list items are joined.
    pub fn to_cell(&self) -> String {
        match self {
            FieldValue::Text(s) => s.clone(),
            FieldValue::List(items) => items.join(constants::LIST_CELL_SEPARATOR),
        }
    }
}

/// Records produced by running a template over one output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedTable {
    /// Value names in definition order.
    pub header: Vec<String>,
    pub rows: Vec<Vec<FieldValue>>,
}

// =============================================================================
// Template parsing
// =============================================================================

impl Template {
    /// Compile template text. `name` is used in error messages only.
    pub fn parse(name: &str, text: &str) -> Result<Self, TemplateError> {
        let lines: Vec<&str> = text.lines().collect();
        let mut pos = 0;

        let values = parse_values(name, &lines, &mut pos)?;
        let substitutions: HashMap<&str, &str> = values
            .iter()
            .map(|v| (v.name.as_str(), v.group_pattern.as_str()))
            .collect();

        let mut states: HashMap<String, Vec<Rule>> = HashMap::new();
        let mut order: Vec<String> = Vec::new();
        while pos < lines.len() {
            let line = lines[pos];
            if is_comment(line) || line.trim().is_empty() {
                pos += 1;
                continue;
            }
            let state = parse_state_name(name, line, pos + 1)?;
            if states.contains_key(&state) {
                return Err(syntax(name, pos + 1, format!("duplicate state name '{state}'")));
            }
            pos += 1;

            let mut rules = Vec::new();
            while pos < lines.len() {
                let line = lines[pos];
                if line.trim().is_empty() {
                    break;
                }
                if !is_comment(line) {
                    rules.push(parse_rule(name, line, pos + 1, &substitutions)?);
                }
                pos += 1;
            }
            order.push(state.clone());
            states.insert(state, rules);
        }

        let template = Self {
            name: name.to_string(),
            values,
            states,
        };
        template.validate(&order)?;

        tracing::debug!(
            template = %template.name,
            values = template.values.len(),
            states = template.states.len(),
            "Template compiled"
        );
        Ok(template)
    }

    /// Check state references once every state is known.
    fn validate(&self, order: &[String]) -> Result<(), TemplateError> {
        if !self.states.contains_key(STATE_START) {
            return Err(syntax(&self.name, 0, "missing required 'Start' state".to_string()));
        }
        if let Some(rules) = self.states.get(STATE_EOF) {
            if !rules.is_empty() {
                tracing::debug!(template = %self.name, "Rules in EOF state are never run");
            }
        }
        for state in order {
            for rule in &self.states[state] {
                if rule.line_op == LineOp::Error {
                    continue;
                }
                if let Some(ref target) = rule.new_state {
                    if target != STATE_END
                        && target != STATE_EOF
                        && !self.states.contains_key(target)
                    {
                        return Err(syntax(
                            &self.name,
                            rule.line_number,
                            format!("state '{target}' is not defined"),
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Value names in definition order (the output column order).
    pub fn header(&self) -> Vec<String> {
        self.values.iter().map(|v| v.name.clone()).collect()
    }

    pub fn values(&self) -> &[ValueDef] {
        &self.values
    }

    /// Names of values flagged `Key`.
    pub fn keys(&self) -> Vec<String> {
        self.values
            .iter()
            .filter(|v| v.options.key)
            .map(|v| v.name.clone())
            .collect()
    }
}

fn parse_values(
    template: &str,
    lines: &[&str],
    pos: &mut usize,
) -> Result<Vec<ValueDef>, TemplateError> {
    let mut values: Vec<ValueDef> = Vec::new();

    while *pos < lines.len() {
        let line = lines[*pos];
        let line_number = *pos + 1;
        if line.trim().is_empty() {
            *pos += 1;
            if values.is_empty() {
                continue;
            }
            return Ok(values);
        }
        if is_comment(line) {
            *pos += 1;
            continue;
        }
        if !line.starts_with("Value ") {
            if values.is_empty() {
                return Err(syntax(template, line_number, "expected a 'Value' definition".into()));
            }
            return Err(syntax(
                template,
                line_number,
                "expected blank line after last Value entry".into(),
            ));
        }

        let value = parse_value_line(template, line, line_number)?;
        if values.iter().any(|v| v.name == value.name) {
            return Err(syntax(
                template,
                line_number,
                format!("duplicate value name '{}'", value.name),
            ));
        }
        values.push(value);
        *pos += 1;
    }

    if values.is_empty() {
        return Err(syntax(template, lines.len(), "no Value definitions found".into()));
    }
    Err(syntax(template, lines.len(), "no state definitions found".into()))
}

fn parse_value_line(
    template: &str,
    line: &str,
    line_number: usize,
) -> Result<ValueDef, TemplateError> {
    let tokens: Vec<&str> = line.split(' ').collect();
    if tokens.len() < 3 {
        return Err(syntax(template, line_number, "expected at least 3 tokens on Value line".into()));
    }

    let (options, name, pattern) = if tokens[2].starts_with('(') {
        (ValueOptions::default(), tokens[1], tokens[2..].join(" "))
    } else {
        (
            ValueOptions::parse(tokens[1], template, line_number)?,
            tokens[2],
            tokens[3..].join(" "),
        )
    };

    if name.is_empty()
        || name.len() > MAX_NAME_LENGTH
        || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(syntax(template, line_number, format!("invalid value name '{name}'")));
    }
    if !pattern.starts_with('(') || !pattern.ends_with(')') || pattern.ends_with("\\)") {
        return Err(syntax(
            template,
            line_number,
            format!("value '{name}' regex must be contained within parentheses"),
        ));
    }
    check_length(template, line_number, &pattern)?;
    compile(template, line_number, &pattern)?;

    let group_pattern = format!("(?P<{name}>{}", &pattern[1..]);
    Ok(ValueDef {
        name: name.to_string(),
        options,
        pattern,
        group_pattern,
    })
}

fn parse_state_name(template: &str, line: &str, line_number: usize) -> Result<String, TemplateError> {
    if line.starts_with(char::is_whitespace) {
        return Err(syntax(template, line_number, "rule found outside of a state".into()));
    }
    let name = line.trim_end();
    if name.len() > MAX_NAME_LENGTH
        || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(syntax(template, line_number, format!("invalid state name '{name}'")));
    }
    if name == STATE_END {
        return Err(syntax(template, line_number, "'End' is reserved and cannot be defined".into()));
    }
    Ok(name.to_string())
}

fn parse_rule(
    template: &str,
    line: &str,
    line_number: usize,
    substitutions: &HashMap<&str, &str>,
) -> Result<Rule, TemplateError> {
    static SEPARATOR: OnceLock<Regex> = OnceLock::new();

    if !(line.starts_with(char::is_whitespace) && line.trim_start().starts_with('^')) {
        return Err(syntax(
            template,
            line_number,
            "missing white space or caret ('^') before rule".into(),
        ));
    }
    let line = line.trim();

    // Last whitespace-then-arrow splits the match from the action.
    let separator = SEPARATOR
        .get_or_init(|| Regex::new(r"^(?P<rule>.*)\s->(?P<action>.*)$").expect("static separator regex"));
    let (match_part, action_part) = match separator.captures(line) {
        Some(caps) => match (caps.name("rule"), caps.name("action")) {
            (Some(rule), Some(action)) => (rule.as_str(), Some(action.as_str())),
            _ => (line, None),
        },
        None => (line, None),
    };

    let expanded = substitute(template, line_number, match_part, substitutions)?;
    check_length(template, line_number, &expanded)?;
    let regex = compile(template, line_number, &expanded)?;

    let (line_op, record_op, new_state) = match action_part {
        Some(action) => parse_action(template, line_number, action)?,
        None => (LineOp::Next, RecordOp::NoRecord, None),
    };

    Ok(Rule {
        regex,
        line_op,
        record_op,
        new_state,
        line_number,
    })
}

/// Parse the text after `->`.
///
/// Accepted forms: `LineOp[.RecordOp] [State]`, `RecordOp [State]`, `[State]`.
fn parse_action(
    template: &str,
    line_number: usize,
    action: &str,
) -> Result<(LineOp, RecordOp, Option<String>), TemplateError> {
    static FULL: OnceLock<Regex> = OnceLock::new();
    static RECORD_ONLY: OnceLock<Regex> = OnceLock::new();
    static STATE_ONLY: OnceLock<Regex> = OnceLock::new();

    let new_state = r#"(?P<new_state>\w+|".*")"#;
    let full = FULL.get_or_init(|| {
        Regex::new(&format!(
            r"^\s+(?P<ln_op>Continue|Next|Error)(\.(?P<rec_op>Clear|Clearall|Record|NoRecord))?(\s+{new_state})?$"
        ))
        .expect("static action regex")
    });
    let record_only = RECORD_ONLY.get_or_init(|| {
        Regex::new(&format!(
            r"^\s+(?P<rec_op>Clear|Clearall|Record|NoRecord)(\s+{new_state})?$"
        ))
        .expect("static action regex")
    });
    let state_only = STATE_ONLY.get_or_init(|| {
        Regex::new(&format!(r"^(\s+{new_state})?$")).expect("static action regex")
    });

    let caps = full
        .captures(action)
        .or_else(|| record_only.captures(action))
        .or_else(|| state_only.captures(action))
        .ok_or_else(|| syntax(template, line_number, format!("badly formatted action '{}'", action.trim())))?;

    let line_op = match caps.name("ln_op").map(|m| m.as_str()) {
        Some("Continue") => LineOp::Continue,
        Some("Error") => LineOp::Error,
        _ => LineOp::Next,
    };
    let record_op = match caps.name("rec_op").map(|m| m.as_str()) {
        Some("Record") => RecordOp::Record,
        Some("Clear") => RecordOp::Clear,
        Some("Clearall") => RecordOp::Clearall,
        _ => RecordOp::NoRecord,
    };
    let new_state = caps.name("new_state").map(|m| m.as_str().to_string());

    if line_op == LineOp::Continue && new_state.is_some() {
        return Err(syntax(
            template,
            line_number,
            "action 'Continue' cannot be combined with a state change".into(),
        ));
    }
    if line_op != LineOp::Error {
        if let Some(ref state) = new_state {
            if state.starts_with('"') {
                return Err(syntax(
                    template,
                    line_number,
                    "alphanumeric characters only in state names".into(),
                ));
            }
        }
    }
    let new_state = match (line_op, new_state) {
        (LineOp::Error, Some(msg)) => Some(msg.trim_matches('"').to_string()),
        (_, state) => state,
    };

    Ok((line_op, record_op, new_state))
}

/// Replace `$Name` / `${Name}` with the value's named-group pattern; `$$`
/// becomes a literal `$` (the end-of-line anchor in a rule).
fn substitute(
    template: &str,
    line_number: usize,
    text: &str,
    substitutions: &HashMap<&str, &str>,
) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(text.len() * 2);
    let mut rest = text;

    while let Some(idx) = rest.find('$') {
        out.push_str(&rest[..idx]);
        let after = &rest[idx + 1..];

        if let Some(tail) = after.strip_prefix('$') {
            out.push('$');
            rest = tail;
            continue;
        }

        let (name, consumed) = if let Some(braced) = after.strip_prefix('{') {
            let close = braced.find('}').ok_or_else(|| {
                syntax(template, line_number, "unterminated '${' substitution".into())
            })?;
            (&braced[..close], close + 2)
        } else {
            let len = after
                .char_indices()
                .find(|(i, c)| !(c.is_ascii_alphanumeric() || *c == '_') || (*i == 0 && c.is_ascii_digit()))
                .map(|(i, _)| i)
                .unwrap_or(after.len());
            (&after[..len], len)
        };

        if name.is_empty() {
            return Err(syntax(
                template,
                line_number,
                "invalid '$' placeholder (use '$$' for a literal '$')".into(),
            ));
        }
        let pattern = substitutions.get(name).ok_or_else(|| {
            syntax(template, line_number, format!("unknown value '{name}' in rule"))
        })?;
        out.push_str(pattern);
        rest = &after[consumed..];
    }
    out.push_str(rest);
    Ok(out)
}

fn is_comment(line: &str) -> bool {
    line.trim_start().starts_with('#')
}

fn check_length(template: &str, line_number: usize, pattern: &str) -> Result<(), TemplateError> {
    if pattern.len() > constants::MAX_REGEX_PATTERN_LENGTH {
        return Err(TemplateError::RegexTooLong {
            template: template.to_string(),
            line_number,
            length: pattern.len(),
            max_length: constants::MAX_REGEX_PATTERN_LENGTH,
        });
    }
    Ok(())
}

fn compile(template: &str, line_number: usize, pattern: &str) -> Result<Regex, TemplateError> {
    Regex::new(pattern).map_err(|e| TemplateError::InvalidRegex {
        template: template.to_string(),
        line_number,
        pattern: pattern.to_string(),
        source: e,
    })
}

fn syntax(template: &str, line_number: usize, reason: String) -> TemplateError {
    TemplateError::Syntax {
        template: template.to_string(),
        line_number,
        reason,
    }
}

// =============================================================================
// Running a template
// =============================================================================

/// Per-value state while parsing one output.
#[derive(Debug, Default, Clone)]
struct Slot {
    current: Option<String>,
    items: Vec<String>,
    filldown_saved: Option<String>,
}

struct Run<'t> {
    template: &'t Template,
    slots: Vec<Slot>,
    rows: Vec<Vec<FieldValue>>,
}

impl<'t> Run<'t> {
    fn new(template: &'t Template) -> Self {
        Self {
            template,
            slots: vec![Slot::default(); template.values.len()],
            rows: Vec::new(),
        }
    }

    fn assign(&mut self, idx: usize, value: Option<String>) {
        let options = self.template.values[idx].options;
        let slot = &mut self.slots[idx];
        if options.list {
            if let Some(ref v) = value {
                slot.items.push(v.clone());
            }
        }
        if options.filldown {
            slot.filldown_saved = value.clone();
        }
        if options.fillup {
            if let Some(ref v) = value {
                if !v.is_empty() {
                    for row in self.rows.iter_mut().rev() {
                        if row[idx].is_filled() {
                            break;
                        }
                        row[idx] = FieldValue::Text(v.clone());
                    }
                }
            }
        }
        slot.current = value;
    }

    fn clear(&mut self) {
        for (slot, def) in self.slots.iter_mut().zip(&self.template.values) {
            slot.current = None;
            if def.options.filldown {
                slot.current = slot.filldown_saved.clone();
            } else {
                slot.items.clear();
            }
        }
    }

    fn clear_all(&mut self) {
        for slot in &mut self.slots {
            *slot = Slot::default();
        }
    }

    fn record(&mut self) {
        let mut row = Vec::with_capacity(self.slots.len());
        let mut all_empty = true;

        for (slot, def) in self.slots.iter().zip(&self.template.values) {
            let value = if def.options.list {
                if !slot.items.is_empty() {
                    all_empty = false;
                }
                FieldValue::List(slot.items.clone())
            } else {
                if slot.current.is_some() {
                    all_empty = false;
                }
                FieldValue::Text(slot.current.clone().unwrap_or_default())
            };
            if def.options.required && !value.is_filled() {
                self.clear();
                return;
            }
            row.push(value);
        }

        if all_empty {
            return;
        }
        self.rows.push(row);
        self.clear();
    }
}

impl Template {
    /// Run the template over one device output.
    ///
    /// Returns every emitted record; an output that matches nothing yields
    /// an empty table. An `Error` action aborts with `TemplateError::Action`.
    pub fn parse_text(&self, text: &str) -> Result<ParsedTable, TemplateError> {
        let mut run = Run::new(self);
        let mut state_name: &str = STATE_START;

        'lines: for line in text.lines() {
            let Some(rules) = self.states.get(state_name) else {
                break;
            };
            for rule in rules {
                let Some(caps) = rule.regex.captures(line) else {
                    continue;
                };
                for (idx, def) in self.values.iter().enumerate() {
                    if rule.regex.capture_names().flatten().any(|n| n == def.name) {
                        run.assign(idx, caps.name(&def.name).map(|m| m.as_str().to_string()));
                    }
                }

                match rule.record_op {
                    RecordOp::Record => run.record(),
                    RecordOp::Clear => run.clear(),
                    RecordOp::Clearall => run.clear_all(),
                    RecordOp::NoRecord => {}
                }

                match rule.line_op {
                    LineOp::Error => {
                        return Err(TemplateError::Action {
                            template: self.name.clone(),
                            state: state_name.to_string(),
                            message: rule
                                .new_state
                                .clone()
                                .unwrap_or_else(|| "state error raised".to_string()),
                            line: line.to_string(),
                        });
                    }
                    LineOp::Continue => continue,
                    LineOp::Next => {
                        if let Some(ref next) = rule.new_state {
                            state_name = next.as_str();
                        }
                        if state_name == STATE_END || state_name == STATE_EOF {
                            break 'lines;
                        }
                        continue 'lines;
                    }
                }
            }
        }

        // Implicit record at end of input, unless parsing reached End or the
        // template declares its own EOF state.
        if state_name != STATE_END && !self.states.contains_key(STATE_EOF) {
            run.record();
        }

        Ok(ParsedTable {
            header: self.header(),
            rows: run.rows,
        })
    }
}
