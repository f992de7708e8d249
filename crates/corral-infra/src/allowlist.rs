//! Shell-command allowlist.
//!
//! The allowlist is a YAML mapping from pattern to `true | false |
//! {approve: bool, matchCommandLine: bool}`. A pattern is a literal (matched
//! as a command prefix or as the base name of the first token) or a
//! `/regex/flags` form. A command line is checked both as a whole (rules with
//! `matchCommandLine: true`) and split into sub-commands at `|| && ; |` plus
//! inline substitutions. Any deny short-circuits; approval requires every
//! sub-command approved or the full line approved.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result, bail};
use regex::RegexBuilder;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone)]
enum Matcher {
    Literal(String),
    Regex(regex::Regex),
}

impl Matcher {
    fn matches(&self, command: &str) -> bool {
        let command = command.trim();
        match self {
            Self::Literal(pattern) => {
                if command.starts_with(pattern.as_str()) {
                    return true;
                }
                let first = command.split_whitespace().next().unwrap_or("");
                let base = first.rsplit('/').next().unwrap_or(first);
                base == pattern
            }
            Self::Regex(re) => re.is_match(command),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AllowRule {
    pub pattern: String,
    pub approve: bool,
    pub match_command_line: bool,
    matcher: Matcher,
}

impl AllowRule {
    fn new(pattern: &str, approve: bool, match_command_line: bool) -> Result<Self> {
        let matcher = if let Some(body) = pattern.strip_prefix('/') {
            let Some(slash) = body.rfind('/') else {
                bail!("regex pattern {pattern:?} is missing its closing slash");
            };
            let (expr, flags) = body.split_at(slash);
            let flags = &flags[1..];
            let re = RegexBuilder::new(expr)
                .case_insensitive(flags.contains('i'))
                .multi_line(flags.contains('m'))
                .build()
                .with_context(|| format!("invalid regex pattern {pattern:?}"))?;
            Matcher::Regex(re)
        } else {
            Matcher::Literal(pattern.to_string())
        };
        Ok(Self {
            pattern: pattern.to_string(),
            approve,
            match_command_line,
            matcher,
        })
    }

    fn matches(&self, command: &str) -> bool {
        self.matcher.matches(command)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RawRule {
    Flag(bool),
    Detailed {
        approve: bool,
        #[serde(default, rename = "matchCommandLine")]
        match_command_line: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckResult {
    Approved,
    /// Neither approved nor denied; the approval pipeline takes over.
    NeedsApproval,
    Denied { rule: String },
}

#[derive(Debug, Clone, Default)]
pub struct Allowlist {
    rules: Vec<AllowRule>,
}

impl Allowlist {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read allowlist {}", path.display()))?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self> {
        // serde_yaml mappings preserve file order, which fixes rule order.
        let raw: serde_yaml::Mapping =
            serde_yaml::from_str(text).context("allowlist is not a YAML mapping")?;
        let mut rules = Vec::new();
        for (key, value) in raw {
            let Some(pattern) = key.as_str() else {
                bail!("allowlist pattern keys must be strings");
            };
            let rule: RawRule = serde_yaml::from_value(value)
                .with_context(|| format!("invalid allowlist rule for {pattern:?}"))?;
            let (approve, match_command_line) = match rule {
                RawRule::Flag(approve) => (approve, false),
                RawRule::Detailed {
                    approve,
                    match_command_line,
                } => (approve, match_command_line),
            };
            rules.push(AllowRule::new(pattern, approve, match_command_line)?);
        }
        Ok(Self { rules })
    }

    /// Build a per-session allowlist from a tool grant's `allowlist` option:
    /// a JSON mapping of pattern → bool.
    pub fn from_option_map(map: &BTreeMap<String, Value>) -> Result<Self> {
        let mut rules = Vec::new();
        for (pattern, value) in map {
            let approve = value.as_bool().unwrap_or(false);
            rules.push(AllowRule::new(pattern, approve, false)?);
        }
        Ok(Self { rules })
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Patterns with `approve: true`, for unattended failure messages.
    pub fn approved_patterns(&self) -> Vec<String> {
        self.rules
            .iter()
            .filter(|r| r.approve)
            .map(|r| r.pattern.clone())
            .collect()
    }

    pub fn check(&self, command_line: &str) -> CheckResult {
        let sub_commands = split_subcommands(command_line);

        // Any deny wins, whether it hits a sub-command or the full line.
        for rule in self.rules.iter().filter(|r| !r.approve) {
            if rule.match_command_line {
                if rule.matches(command_line) {
                    return CheckResult::Denied {
                        rule: rule.pattern.clone(),
                    };
                }
            }
            for sub in &sub_commands {
                if rule.matches(sub) {
                    return CheckResult::Denied {
                        rule: rule.pattern.clone(),
                    };
                }
            }
        }

        let full_line_approved = self
            .rules
            .iter()
            .any(|r| r.approve && r.match_command_line && r.matches(command_line));
        if full_line_approved {
            return CheckResult::Approved;
        }

        let every_sub_approved = !sub_commands.is_empty()
            && sub_commands.iter().all(|sub| {
                self.rules
                    .iter()
                    .any(|r| r.approve && !r.match_command_line && r.matches(sub))
            });
        if every_sub_approved {
            CheckResult::Approved
        } else {
            CheckResult::NeedsApproval
        }
    }
}

/// Split a command line into sub-commands at `||`, `&&`, `;`, `|` and
/// inline-substitution forms: backticks, `$(…)`, `<(…)`, `>(…)`. Substituted
/// bodies are themselves split recursively; the enclosing segment is kept
/// with the substitution in place. Single quotes suppress everything, double
/// quotes suppress separators but not substitutions.
pub fn split_subcommands(command_line: &str) -> Vec<String> {
    let mut out = Vec::new();
    collect_subcommands(command_line, &mut out);
    out
}

fn collect_subcommands(line: &str, out: &mut Vec<String>) {
    let chars: Vec<char> = line.chars().collect();
    let mut segment = String::new();
    let mut i = 0;

    let mut flush = |segment: &mut String, out: &mut Vec<String>| {
        let trimmed = segment.trim();
        if !trimmed.is_empty() {
            out.push(trimmed.to_string());
        }
        segment.clear();
    };

    while i < chars.len() {
        let c = chars[i];
        match c {
            '\'' => {
                segment.push(c);
                i += 1;
                while i < chars.len() {
                    segment.push(chars[i]);
                    if chars[i] == '\'' {
                        i += 1;
                        break;
                    }
                    i += 1;
                }
            }
            '`' => {
                // backtick substitution: body is a separate command
                let start = i + 1;
                let mut j = start;
                while j < chars.len() && chars[j] != '`' {
                    j += 1;
                }
                let body: String = chars[start..j.min(chars.len())].iter().collect();
                collect_subcommands(&body, out);
                segment.push_str(&line_slice(&chars, i, (j + 1).min(chars.len())));
                i = (j + 1).min(chars.len());
            }
            '$' | '<' | '>' if i + 1 < chars.len() && chars[i + 1] == '(' => {
                let mut depth = 1;
                let start = i + 2;
                let mut j = start;
                while j < chars.len() && depth > 0 {
                    match chars[j] {
                        '(' => depth += 1,
                        ')' => depth -= 1,
                        _ => {}
                    }
                    j += 1;
                }
                let body_end = if depth == 0 { j - 1 } else { j };
                let body: String = chars[start..body_end].iter().collect();
                collect_subcommands(&body, out);
                segment.push_str(&line_slice(&chars, i, j));
                i = j;
            }
            '"' => {
                segment.push(c);
                i += 1;
                while i < chars.len() && chars[i] != '"' {
                    // substitutions still fire inside double quotes
                    if chars[i] == '$' && i + 1 < chars.len() && chars[i + 1] == '(' {
                        let mut depth = 1;
                        let start = i + 2;
                        let mut j = start;
                        while j < chars.len() && depth > 0 {
                            match chars[j] {
                                '(' => depth += 1,
                                ')' => depth -= 1,
                                _ => {}
                            }
                            j += 1;
                        }
                        let body_end = if depth == 0 { j - 1 } else { j };
                        let body: String = chars[start..body_end].iter().collect();
                        collect_subcommands(&body, out);
                        segment.push_str(&line_slice(&chars, i, j));
                        i = j;
                        continue;
                    }
                    segment.push(chars[i]);
                    i += 1;
                }
                if i < chars.len() {
                    segment.push('"');
                    i += 1;
                }
            }
            '|' | '&' | ';' => {
                flush(&mut segment, out);
                // swallow the second char of || and &&
                if i + 1 < chars.len() && (chars[i + 1] == '|' || chars[i + 1] == '&') {
                    i += 1;
                }
                i += 1;
            }
            _ => {
                segment.push(c);
                i += 1;
            }
        }
    }
    flush(&mut segment, out);
}

fn line_slice(chars: &[char], start: usize, end: usize) -> String {
    chars[start..end.min(chars.len())].iter().collect()
}
