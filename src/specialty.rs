//! Role-specific deterministic transforms applied by workers
//!
//! A worker's free-text role is classified into a [`Specialty`]; each
//! specialty turns the files named in its instructions into a Markdown
//! report and, for migrations, rewritten sources. None of this is a
//! contract: the heuristics are best effort and never gate the engine's
//! invariants.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Extensions recognised when extracting filenames from free text
const KNOWN_EXTENSIONS: &str =
    "log|txt|md|markdown|csv|json|html|htm|xml|yaml|yml|toml|ini|cfg|py|rs|js|ts|java|go|rb|php|c|h|cpp|sh|sql";

static FILENAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?i)[\w\-./]*\w\.(?:{KNOWN_EXTENSIONS})\b"))
        .expect("filename regex should compile")
});

/// Find file names mentioned in `text`, in order of first mention
pub fn extract_filenames(text: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for m in FILENAME_RE.find_iter(text) {
        let name = m.as_str().trim_start_matches("./").to_string();
        if !names.contains(&name) {
            names.push(name);
        }
    }
    names
}

/// Whether a missing file with this name should be produced as a report
pub fn is_report_target(name: &str) -> bool {
    matches!(
        extension(name).to_ascii_lowercase().as_str(),
        "md" | "txt" | "json" | "csv" | "html"
    )
}

fn extension(name: &str) -> &str {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
}

/// Family of deterministic transforms a worker applies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Specialty {
    LogAnalysis,
    Documentation,
    SecurityAudit,
    Performance,
    Migration,
    CodeReview,
    General,
}

/// Keyword rules, first match wins
const CLASSIFY_RULES: &[(Specialty, &[&str])] = &[
    (Specialty::Migration, &["migr", "python 3", "python3", "py3"]),
    (
        Specialty::SecurityAudit,
        &["secur", "sécu", "vulnerab", "vulnérab", "audit", "pentest"],
    ),
    (
        Specialty::Performance,
        &["perf", "latenc", "metric", "métrique", "bottleneck", "goulot"],
    ),
    (Specialty::CodeReview, &["review", "revue", "relecture"]),
    (
        Specialty::Documentation,
        &["doc", "rédact", "redact", "writer"],
    ),
    (Specialty::LogAnalysis, &["log"]),
];

impl Specialty {
    /// Classify a role or objective from its keywords (English or French)
    pub fn classify(text: &str) -> Self {
        let lowered = text.to_lowercase();
        CLASSIFY_RULES
            .iter()
            .find(|(_, keywords)| keywords.iter().any(|k| lowered.contains(k)))
            .map(|(specialty, _)| *specialty)
            .unwrap_or(Specialty::General)
    }

    pub fn default_role(&self) -> &'static str {
        match self {
            Specialty::LogAnalysis => "Log Analyst",
            Specialty::Documentation => "Technical Writer",
            Specialty::SecurityAudit => "Security Auditor",
            Specialty::Performance => "Performance Analyst",
            Specialty::Migration => "Migration Engineer",
            Specialty::CodeReview => "Code Reviewer",
            Specialty::General => "Generalist",
        }
    }

    /// Heading of the generated report
    pub fn title(&self) -> &'static str {
        match self {
            Specialty::LogAnalysis => "Log Analysis Report",
            Specialty::Documentation => "API Documentation",
            Specialty::SecurityAudit => "Security Audit Report",
            Specialty::Performance => "Performance Analysis Report",
            Specialty::Migration => "Migration Report",
            Specialty::CodeReview => "Code Review Report",
            Specialty::General => "Summary Report",
        }
    }
}

/// A file read by a worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputFile {
    pub name: String,
    pub content: String,
}

impl InputFile {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }
}

/// Extra file produced by a transform (e.g. a migrated source)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedFile {
    pub name: String,
    pub content: String,
}

/// Outcome of a transform
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub specialty: Specialty,
    /// One-line findings for the worker's summary
    pub highlights: Vec<String>,
    /// Full Markdown report
    pub body: String,
    pub derived: Vec<DerivedFile>,
}

/// Apply the specialty's transform to the given inputs
pub fn analyse(specialty: Specialty, inputs: &[InputFile]) -> Report {
    let mut report = Report {
        specialty,
        highlights: Vec::new(),
        body: format!("# {}\n\n", specialty.title()),
        derived: Vec::new(),
    };
    if inputs.is_empty() {
        report.highlights.push("no input file could be read".into());
        report.body.push_str("No input file could be read.\n");
        return report;
    }

    match specialty {
        Specialty::LogAnalysis => analyse_logs(inputs, &mut report),
        Specialty::Documentation => document(inputs, &mut report),
        Specialty::SecurityAudit => audit(inputs, &mut report),
        Specialty::Performance => profile(inputs, &mut report),
        Specialty::Migration => migrate(inputs, &mut report),
        Specialty::CodeReview => review(inputs, &mut report),
        Specialty::General => summarise(inputs, &mut report),
    }
    report
}

// === Findings ===

/// Severity of a finding, most severe first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Critical => "CRITICAL",
            Severity::High => "HIGH",
            Severity::Medium => "MEDIUM",
            Severity::Low => "LOW",
            Severity::Info => "INFO",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Finding {
    file: String,
    line: usize,
    severity: Severity,
    message: &'static str,
    excerpt: String,
}

struct Rule {
    pattern: Regex,
    severity: Severity,
    message: &'static str,
}

fn rule(pattern: &str, severity: Severity, message: &'static str) -> Rule {
    Rule {
        pattern: Regex::new(pattern).expect("finding rule regex should compile"),
        severity,
        message,
    }
}

fn scan(inputs: &[InputFile], rules: &[Rule]) -> Vec<Finding> {
    let mut findings = Vec::new();
    for input in inputs {
        for (idx, line) in input.content.lines().enumerate() {
            for rule in rules {
                if rule.pattern.is_match(line) {
                    findings.push(Finding {
                        file: input.name.clone(),
                        line: idx + 1,
                        severity: rule.severity,
                        message: rule.message,
                        excerpt: line.trim().to_string(),
                    });
                }
            }
        }
    }
    findings.sort_by(|a, b| {
        (a.severity, &a.file, a.line).cmp(&(b.severity, &b.file, b.line))
    });
    findings
}

fn severity_counts(findings: &[Finding]) -> BTreeMap<Severity, usize> {
    let mut counts = BTreeMap::new();
    for finding in findings {
        *counts.entry(finding.severity).or_insert(0) += 1;
    }
    counts
}

fn render_findings(findings: &[Finding], body: &mut String) {
    if findings.is_empty() {
        body.push_str("No findings.\n");
        return;
    }
    body.push_str("| Severity | Count |\n|---|---|\n");
    for (severity, count) in severity_counts(findings) {
        body.push_str(&format!("| {severity} | {count} |\n"));
    }
    body.push_str("\n## Findings\n\n");
    for f in findings {
        body.push_str(&format!(
            "- **[{}]** `{}:{}` {}\n  `{}`\n",
            f.severity, f.file, f.line, f.message, f.excerpt
        ));
    }
}

fn findings_highlight(findings: &[Finding]) -> String {
    let counts: Vec<String> = severity_counts(findings)
        .into_iter()
        .map(|(s, n)| format!("{n} {}", s.to_string().to_lowercase()))
        .collect();
    if counts.is_empty() {
        "0 findings".into()
    } else {
        format!("{} findings ({})", findings.len(), counts.join(", "))
    }
}

// === Log Analysis ===

static LOG_LEVEL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(CRITICAL|FATAL|ERROR|WARNING|WARN|INFO|DEBUG|TRACE)\b:?\s*(.*)$")
        .expect("log level regex should compile")
});

fn analyse_logs(inputs: &[InputFile], report: &mut Report) {
    for input in inputs {
        let mut levels: BTreeMap<String, usize> = BTreeMap::new();
        let mut issues: BTreeMap<(String, String), usize> = BTreeMap::new();
        let mut total = 0;

        for line in input.content.lines().filter(|l| !l.trim().is_empty()) {
            total += 1;
            let Some(caps) = LOG_LEVEL_RE.captures(line) else {
                continue;
            };
            let level = match &caps[1] {
                "WARN" => "WARNING".to_string(),
                "FATAL" => "CRITICAL".to_string(),
                other => other.to_string(),
            };
            *levels.entry(level.clone()).or_insert(0) += 1;
            if matches!(level.as_str(), "CRITICAL" | "ERROR" | "WARNING") {
                *issues.entry((level, caps[2].trim().to_string())).or_insert(0) += 1;
            }
        }

        let count = |level: &str| levels.get(level).copied().unwrap_or(0);
        report.highlights.push(format!(
            "{}: {} lines, {} errors, {} warnings",
            input.name,
            total,
            count("ERROR") + count("CRITICAL"),
            count("WARNING")
        ));

        let body = &mut report.body;
        body.push_str(&format!("## {}\n\n{} log lines.\n\n", input.name, total));
        if levels.is_empty() {
            body.push_str("No leveled entries found.\n\n");
            continue;
        }
        body.push_str("| Level | Count |\n|---|---|\n");
        for (level, n) in &levels {
            body.push_str(&format!("| {level} | {n} |\n"));
        }

        let mut ranked: Vec<_> = issues.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        if !ranked.is_empty() {
            body.push_str("\n### Issues by frequency\n\n");
            for ((level, message), n) in ranked {
                body.push_str(&format!("- {n}x {level}: {message}\n"));
            }
        }
        body.push('\n');
    }
}

// === Documentation ===

static DECLARATION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(\s*)(?:pub(?:\([^)]*\))?\s+)?(?:export\s+)?(?:async\s+)?(def|class|fn|struct|enum|trait|function)\s+(\w+)(.*)$",
    )
    .expect("declaration regex should compile")
});

struct Declaration {
    indent: usize,
    keyword: String,
    signature: String,
    doc: Option<String>,
}

fn declarations(content: &str) -> Vec<Declaration> {
    let lines: Vec<&str> = content.lines().collect();
    let mut found = Vec::new();

    for (idx, line) in lines.iter().enumerate() {
        let Some(caps) = DECLARATION_RE.captures(line) else {
            continue;
        };
        let rest = caps[4]
            .trim_end()
            .trim_end_matches('{')
            .trim_end_matches(':')
            .trim_end();
        found.push(Declaration {
            indent: caps[1].len(),
            keyword: caps[2].to_string(),
            signature: format!("{}{}", &caps[3], rest),
            doc: docstring_after(&lines[idx + 1..]).or_else(|| comments_before(&lines[..idx])),
        });
    }
    found
}

/// Python-style docstring opening the body
fn docstring_after(lines: &[&str]) -> Option<String> {
    let mut iter = lines.iter().map(|l| l.trim()).skip_while(|l| l.is_empty());
    let first = iter.next()?;
    let quote = ["\"\"\"", "'''"].into_iter().find(|q| first.starts_with(*q))?;

    let opened = &first[quote.len()..];
    if let Some(end) = opened.find(quote) {
        return Some(opened[..end].trim().to_string()).filter(|s| !s.is_empty());
    }
    let mut text: Vec<&str> = vec![opened];
    for line in iter {
        if let Some(end) = line.find(quote) {
            text.push(&line[..end]);
            break;
        }
        text.push(line);
    }
    let joined = text
        .into_iter()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    Some(joined).filter(|s| !s.is_empty())
}

/// `///`, `//` or `#` comment block directly above a declaration
fn comments_before(lines: &[&str]) -> Option<String> {
    let mut block: Vec<&str> = lines
        .iter()
        .rev()
        .map(|l| l.trim())
        .take_while(|l| l.starts_with("//") || (l.starts_with('#') && !l.starts_with("#[")))
        .map(|l| l.trim_start_matches(&['/', '#', '!'][..]).trim())
        .collect();
    block.reverse();
    let joined = block.join(" ");
    Some(joined).filter(|s| !s.is_empty())
}

fn document(inputs: &[InputFile], report: &mut Report) {
    for input in inputs {
        let decls = declarations(&input.content);
        let documented = decls.iter().filter(|d| d.doc.is_some()).count();
        report.highlights.push(format!(
            "{}: {} declarations, {} documented",
            input.name,
            decls.len(),
            documented
        ));

        let body = &mut report.body;
        body.push_str(&format!("## `{}`\n\n", input.name));
        if decls.is_empty() {
            body.push_str("No declarations found.\n\n");
            continue;
        }
        let base = decls.iter().map(|d| d.indent).min().unwrap_or(0);
        for decl in &decls {
            let nesting = "  ".repeat((decl.indent - base) / 4);
            body.push_str(&format!("{nesting}- **{}** `{}`", decl.keyword, decl.signature));
            match &decl.doc {
                Some(doc) => body.push_str(&format!(": {doc}\n")),
                None => body.push_str(": *undocumented*\n"),
            }
        }
        body.push('\n');
    }
}

// === Security Audit ===

static SECURITY_RULES: Lazy<Vec<Rule>> = Lazy::new(|| {
    vec![
        rule(r"shell\s*=\s*True", Severity::Critical, "Command injection: subprocess with shell=True"),
        rule(r"\bpickle\.loads?\s*\(", Severity::Critical, "Unsafe deserialization with pickle"),
        rule(r"\bos\.system\s*\(", Severity::High, "Shell command execution with os.system"),
        rule(r"\beval\s*\(", Severity::High, "Dynamic code evaluation with eval"),
        rule(r"\bexec\s*\(", Severity::High, "Dynamic code execution with exec"),
        rule(
            r#"(?i)\b(password|passwd|secret|api_key|token)\w*\s*=\s*['"][^'"]+['"]"#,
            Severity::High,
            "Hardcoded credential",
        ),
        rule(
            r#"(?i)f["'].*\b(select|insert|update|delete)\b"#,
            Severity::High,
            "SQL query built with string interpolation",
        ),
        rule(
            r#"(?i)\b(select|insert|update|delete)\b.*["']\s*(\+|%)"#,
            Severity::High,
            "SQL query built with string concatenation",
        ),
        rule(r"verify\s*=\s*False", Severity::High, "TLS certificate verification disabled"),
        rule(
            r"\bopen\s*\(\s*\w*(file|path|name)\w*\s*[,)]",
            Severity::Medium,
            "File opened from an unvalidated path (path traversal)",
        ),
        rule(
            r"(?i)(password|passwd|pwd)\w*\s*==|==\s*\w*(password|passwd|pwd)",
            Severity::Medium,
            "Secret compared without constant-time comparison",
        ),
        rule(r"\byaml\.load\s*\(", Severity::Medium, "yaml.load without a safe loader"),
        rule(r"(?i)\b(md5|sha1)\s*\(", Severity::Medium, "Weak hash algorithm"),
        rule(r"(?i)debug\s*=\s*True", Severity::Low, "Debug mode enabled"),
        rule(
            r"\brandom\.(random|randint|choice)\s*\(",
            Severity::Low,
            "Non-cryptographic random generator",
        ),
    ]
});

fn audit(inputs: &[InputFile], report: &mut Report) {
    let findings = scan(inputs, &SECURITY_RULES);
    report.highlights.push(findings_highlight(&findings));
    report.body.push_str(&format!(
        "Audited files: {}\n\n",
        inputs.iter().map(|i| i.name.as_str()).collect::<Vec<_>>().join(", ")
    ));
    render_findings(&findings, &mut report.body);
}

// === Performance ===

/// Multiplier of the mean above which a row counts as a bottleneck
const BOTTLENECK_FACTOR: f64 = 1.5;

#[derive(Debug, Clone, Copy, PartialEq)]
struct ColumnStats {
    mean: f64,
    min: f64,
    max: f64,
}

fn column_stats(values: &[f64]) -> Option<ColumnStats> {
    if values.is_empty() {
        return None;
    }
    let sum: f64 = values.iter().sum();
    Some(ColumnStats {
        mean: sum / values.len() as f64,
        min: values.iter().copied().fold(f64::INFINITY, f64::min),
        max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
    })
}

struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    fn parse(content: &str) -> Option<Self> {
        let mut lines = content.lines().filter(|l| !l.trim().is_empty());
        let headers = split_row(lines.next()?);
        let rows = lines
            .map(split_row)
            .filter(|r| r.len() == headers.len())
            .collect();
        Some(Self { headers, rows })
    }

    fn numeric(&self, column: usize) -> Option<Vec<f64>> {
        if self.rows.is_empty() {
            return None;
        }
        self.rows
            .iter()
            .map(|r| r[column].parse::<f64>().ok())
            .collect()
    }
}

fn split_row(line: &str) -> Vec<String> {
    line.split(',')
        .map(|c| c.trim().trim_matches('"').to_string())
        .collect()
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        format!("{value:.2}")
    }
}

fn profile(inputs: &[InputFile], report: &mut Report) {
    for input in inputs {
        let body = &mut report.body;
        body.push_str(&format!("## {}\n\n", input.name));

        let Some(table) = Table::parse(&input.content).filter(|t| !t.rows.is_empty()) else {
            report.highlights.push(format!("{}: no tabular data", input.name));
            body.push_str("No tabular data found.\n\n");
            continue;
        };

        let numeric: Vec<(usize, Vec<f64>)> = (0..table.headers.len())
            .filter_map(|c| table.numeric(c).map(|v| (c, v)))
            .collect();
        let key = (0..table.headers.len())
            .filter(|c| !numeric.iter().any(|(n, _)| n == c))
            .last();

        body.push_str(&format!("{} rows.\n\n", table.rows.len()));
        body.push_str("| Metric | Mean | Min | Max |\n|---|---|---|---|\n");
        for (column, values) in &numeric {
            if let Some(s) = column_stats(values) {
                body.push_str(&format!(
                    "| {} | {} | {} | {} |\n",
                    table.headers[*column],
                    format_number(s.mean),
                    format_number(s.min),
                    format_number(s.max)
                ));
            }
        }

        // Primary metric: a timing column when there is one.
        let primary = numeric
            .iter()
            .find(|(c, _)| {
                let h = table.headers[*c].to_lowercase();
                ["time", "latenc", "duration", "ms"].iter().any(|k| h.contains(k))
            })
            .or_else(|| numeric.first());
        let Some((metric, values)) = primary else {
            report.highlights.push(format!("{}: no numeric column", input.name));
            body.push('\n');
            continue;
        };
        let Some(stats) = column_stats(values) else {
            continue;
        };
        let metric_name = &table.headers[*metric];
        let label = |row: usize| match key {
            Some(k) => table.rows[row][k].clone(),
            None => format!("row {}", row + 1),
        };

        if let Some(k) = key {
            let mut groups: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
            for (row, value) in values.iter().enumerate() {
                groups.entry(table.rows[row][k].as_str()).or_default().push(*value);
            }
            let mut ranked: Vec<(&str, ColumnStats)> = groups
                .into_iter()
                .filter_map(|(g, v)| column_stats(&v).map(|s| (g, s)))
                .collect();
            ranked.sort_by(|a, b| b.1.mean.total_cmp(&a.1.mean));
            body.push_str(&format!(
                "\n### {} by {}\n\n| {} | Mean | Max |\n|---|---|---|\n",
                metric_name, table.headers[k], table.headers[k]
            ));
            for (group, s) in &ranked {
                body.push_str(&format!(
                    "| {} | {} | {} |\n",
                    group,
                    format_number(s.mean),
                    format_number(s.max)
                ));
            }
        }

        let threshold = stats.mean * BOTTLENECK_FACTOR;
        let mut slow: Vec<usize> = (0..values.len()).filter(|&r| values[r] > threshold).collect();
        slow.sort_by(|&a, &b| values[b].total_cmp(&values[a]));

        body.push_str(&format!(
            "\n### Bottlenecks ({} > {})\n\n",
            metric_name,
            format_number(threshold)
        ));
        if slow.is_empty() {
            body.push_str("None detected.\n");
        }
        for &row in &slow {
            body.push_str(&format!("- {}: {}\n", label(row), format_number(values[row])));
        }
        body.push('\n');

        report.highlights.push(format!(
            "{}: {} mean {}, max {}, {} bottleneck rows",
            input.name,
            metric_name,
            format_number(stats.mean),
            format_number(stats.max),
            slow.len()
        ));
    }
}

// === Migration ===

struct Rewrite {
    pattern: Regex,
    replacement: &'static str,
    description: &'static str,
}

fn rewrite(pattern: &str, replacement: &'static str, description: &'static str) -> Rewrite {
    Rewrite {
        pattern: Regex::new(pattern).expect("rewrite regex should compile"),
        replacement,
        description,
    }
}

static PY3_REWRITES: Lazy<Vec<Rewrite>> = Lazy::new(|| {
    vec![
        rewrite(r"^(\s*)print\s*$", "${1}print()", "print statement -> print()"),
        rewrite(
            r"^(\s*)print\s+([^(\s=].*?)\s*$",
            "${1}print(${2})",
            "print statement -> print()",
        ),
        rewrite(
            r#"([\w\]\)'".]+)\.has_key\(([^()]*)\)"#,
            "${2} in ${1}",
            "dict.has_key(k) -> k in dict",
        ),
        rewrite(
            r"except\s+([\w.]+)\s*,\s*(\w+)\s*:",
            "except ${1} as ${2}:",
            "except X, e -> except X as e",
        ),
        rewrite(r"\bxrange\s*\(", "range(", "xrange -> range"),
        rewrite(r"\.iteritems\(\)", ".items()", "iteritems -> items"),
        rewrite(r"\.itervalues\(\)", ".values()", "itervalues -> values"),
        rewrite(r"\.iterkeys\(\)", ".keys()", "iterkeys -> keys"),
        rewrite(r"\braw_input\s*\(", "input(", "raw_input -> input"),
        rewrite(r"\bunicode\s*\(", "str(", "unicode -> str"),
    ]
});

/// Name of the migrated copy: `dir/legacy.py` -> `dir/legacy_py3.py`
pub fn migrated_name(name: &str) -> String {
    let path = Path::new(name);
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or(name);
    let file = match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{stem}_py3.{ext}"),
        None => format!("{stem}_py3"),
    };
    match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => format!("{}/{}", parent.to_string_lossy(), file),
        None => file,
    }
}

fn migrate_source(content: &str) -> (String, BTreeMap<&'static str, usize>) {
    let mut applied: BTreeMap<&'static str, usize> = BTreeMap::new();
    let mut out: Vec<String> = Vec::new();
    for line in content.lines() {
        let mut current = line.to_string();
        for rw in PY3_REWRITES.iter() {
            let n = rw.pattern.find_iter(&current).count();
            if n > 0 {
                current = rw.pattern.replace_all(&current, rw.replacement).into_owned();
                *applied.entry(rw.description).or_insert(0) += n;
            }
        }
        out.push(current);
    }
    let mut migrated = out.join("\n");
    if content.ends_with('\n') {
        migrated.push('\n');
    }
    (migrated, applied)
}

fn migrate(inputs: &[InputFile], report: &mut Report) {
    let sources: Vec<&InputFile> = inputs
        .iter()
        .filter(|i| extension(&i.name).eq_ignore_ascii_case("py"))
        .collect();
    if sources.is_empty() {
        report.highlights.push("no Python source to migrate".into());
        report.body.push_str("No Python source among the inputs.\n");
        return;
    }

    for input in sources {
        let (migrated, applied) = migrate_source(&input.content);
        let target = migrated_name(&input.name);
        let total: usize = applied.values().sum();

        report
            .highlights
            .push(format!("{} -> {}: {} changes", input.name, target, total));
        let body = &mut report.body;
        body.push_str(&format!("## {} -> {}\n\n", input.name, target));
        if applied.is_empty() {
            body.push_str("Already Python 3 compatible.\n\n");
        } else {
            body.push_str("| Change | Occurrences |\n|---|---|\n");
            for (description, n) in &applied {
                body.push_str(&format!("| {description} | {n} |\n"));
            }
            body.push('\n');
        }
        report.derived.push(DerivedFile {
            name: target,
            content: migrated,
        });
    }
}

// === Code Review ===

const MAX_LINE_LENGTH: usize = 100;
const MAX_NESTING: usize = 4;

static REVIEW_RULES: Lazy<Vec<Rule>> = Lazy::new(|| {
    vec![
        rule(
            r#"(?i)(password|passwd|secret)\W*\s*==\s*['"]"#,
            Severity::High,
            "Hardcoded secret in comparison",
        ),
        rule(r"^\s*except\s*:", Severity::Medium, "Bare except clause"),
        rule(
            r"def\s+\w+\s*\([^)]*=\s*(\[\]|\{\}|set\(\))",
            Severity::Medium,
            "Mutable default argument",
        ),
        rule(r"[=!]=\s*None\b", Severity::Low, "Comparison to None should use `is`"),
        rule(
            r"range\s*\(\s*len\s*\(",
            Severity::Low,
            "Iterate directly or use enumerate() instead of range(len())",
        ),
        rule(r"\S[ \t]+$", Severity::Low, "Trailing whitespace"),
        rule(r"\b(TODO|FIXME|XXX)\b", Severity::Info, "Unresolved TODO/FIXME"),
    ]
});

static FUNCTION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?:pub\s+)?(?:async\s+)?(?:def|fn|function)\s+\w+")
        .expect("function regex should compile")
});

fn review(inputs: &[InputFile], report: &mut Report) {
    let mut findings = scan(inputs, &REVIEW_RULES);
    let mut stats = String::from("| File | Lines | Functions | Max nesting |\n|---|---|---|---|\n");

    for input in inputs {
        let lines: Vec<&str> = input.content.lines().collect();
        let functions = lines.iter().filter(|l| FUNCTION_RE.is_match(l)).count();
        let mut max_nesting = 0;

        for (idx, line) in lines.iter().enumerate() {
            if line.chars().count() > MAX_LINE_LENGTH {
                findings.push(Finding {
                    file: input.name.clone(),
                    line: idx + 1,
                    severity: Severity::Low,
                    message: "Line longer than 100 characters",
                    excerpt: crate::agent::preview(line.trim(), 60),
                });
            }
            if line.trim().is_empty() {
                continue;
            }
            let indent = line.len() - line.trim_start().len();
            let nesting = indent / 4;
            if nesting > MAX_NESTING && nesting > max_nesting {
                findings.push(Finding {
                    file: input.name.clone(),
                    line: idx + 1,
                    severity: Severity::Medium,
                    message: "Deeply nested block",
                    excerpt: line.trim().to_string(),
                });
            }
            max_nesting = max_nesting.max(nesting);
        }
        stats.push_str(&format!(
            "| {} | {} | {} | {} |\n",
            input.name,
            lines.len(),
            functions,
            max_nesting
        ));
    }
    findings.sort_by(|a, b| {
        (a.severity, &a.file, a.line).cmp(&(b.severity, &b.file, b.line))
    });

    report.highlights.push(findings_highlight(&findings));
    report.body.push_str(&stats);
    report.body.push('\n');
    render_findings(&findings, &mut report.body);
}

// === General ===

fn summarise(inputs: &[InputFile], report: &mut Report) {
    let body = &mut report.body;
    body.push_str("| File | Lines | Words | Bytes |\n|---|---|---|---|\n");
    let (mut lines, mut words, mut bytes) = (0, 0, 0);
    for input in inputs {
        let l = input.content.lines().count();
        let w = input.content.split_whitespace().count();
        let b = input.content.len();
        body.push_str(&format!("| {} | {} | {} | {} |\n", input.name, l, w, b));
        lines += l;
        words += w;
        bytes += b;
    }
    body.push_str(&format!("| **total** | {lines} | {words} | {bytes} |\n"));
    report.highlights.push(format!(
        "{} files, {} lines, {} words, {} bytes",
        inputs.len(),
        lines,
        words,
        bytes
    ));
}
