//! External copy tools.
//!
//! The copy itself is delegated to a mirror-capable external program. Each variant knows
//! how to build its command line, which exit codes mean success, and how to pull a
//! completion percentage out of its output.
//!
//! Notes:
//! - Robocopy exit codes 0..=7 are informational ("copied", "extra files", "mismatch");
//!   8 and above mean at least one failure.
//! - rsync exit 24 ("some files vanished") is tolerated.
//! - Custom commands accept `{source}`, `{target}` and `{threads}` placeholders.

use std::fmt;
use std::path::Path;
use std::process::Command;

use crate::errors::{MoveError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CopyTool {
    Robocopy,
    Rsync,
    Command { program: String, args: Vec<String> },
}

impl Default for CopyTool {
    fn default() -> Self {
        Self::platform_default()
    }
}

impl CopyTool {
    /// robocopy on Windows, rsync elsewhere.
    pub fn platform_default() -> Self {
        if cfg!(windows) {
            CopyTool::Robocopy
        } else {
            CopyTool::Rsync
        }
    }

    /// Parse a tool spec: `auto`, `robocopy`, `rsync`, or a command line with placeholders.
    pub fn parse(spec: &str) -> Result<Self> {
        let trimmed = spec.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "" | "auto" | "default" => return Ok(Self::platform_default()),
            "robocopy" => return Ok(CopyTool::Robocopy),
            "rsync" => return Ok(CopyTool::Rsync),
            _ => {}
        }
        let mut words = split_command_line(trimmed)?;
        if words.is_empty() {
            return Err(MoveError::Validation("empty copy tool command".into()));
        }
        let program = words.remove(0);
        if !words.iter().any(|w| w.contains("{source}")) || !words.iter().any(|w| w.contains("{target}")) {
            return Err(MoveError::Validation(format!(
                "custom copy command must reference {{source}} and {{target}}: '{trimmed}'"
            )));
        }
        Ok(CopyTool::Command { program, args: words })
    }

    pub fn name(&self) -> &str {
        match self {
            CopyTool::Robocopy => "robocopy",
            CopyTool::Rsync => "rsync",
            CopyTool::Command { program, .. } => program,
        }
    }

    /// Argument vector (without the program) for a mirror of `source` into `target`.
    pub fn args(&self, source: &Path, target: &Path, threads: u32) -> Vec<String> {
        let src = source.display().to_string();
        let dst = target.display().to_string();
        match self {
            CopyTool::Robocopy => {
                let mut v = vec![src, dst];
                v.extend(
                    ["/MIR", "/COPYALL", "/DCOPY:DAT", "/R:0", "/W:0", "/XJ", "/NFL", "/NDL", "/Z", "/ZB"]
                        .iter()
                        .map(|s| s.to_string()),
                );
                v.push(format!("/MT:{threads}"));
                v
            }
            CopyTool::Rsync => vec![
                "-a".into(),
                "--delete".into(),
                "--no-inc-recursive".into(),
                "--info=progress2".into(),
                format!("{}/", src.trim_end_matches('/')),
                format!("{}/", dst.trim_end_matches('/')),
            ],
            CopyTool::Command { args, .. } => args
                .iter()
                .map(|a| {
                    a.replace("{source}", &src)
                        .replace("{target}", &dst)
                        .replace("{threads}", &threads.to_string())
                })
                .collect(),
        }
    }

    /// Ready-to-spawn command (stdio is configured by the supervisor).
    pub fn command(&self, source: &Path, target: &Path, threads: u32) -> Command {
        let mut cmd = Command::new(self.name());
        cmd.args(self.args(source, target, threads));
        cmd
    }

    pub fn is_success(&self, code: i32) -> bool {
        match self {
            CopyTool::Robocopy => (0..8).contains(&code),
            CopyTool::Rsync => code == 0 || code == 24,
            CopyTool::Command { .. } => code == 0,
        }
    }

    /// Extract a completion percentage from one output line.
    pub fn parse_percent(&self, line: &str) -> Option<f64> {
        let t = line.trim();
        match self {
            // robocopy prints bare "  45%" progress lines
            CopyTool::Robocopy => {
                if t.len() <= 5 {
                    parse_pct_token(t)
                } else {
                    None
                }
            }
            _ => t.split_whitespace().find_map(parse_pct_token),
        }
    }
}

impl fmt::Display for CopyTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CopyTool::Command { program, args } => write!(f, "{} {}", program, args.join(" ")),
            other => f.write_str(other.name()),
        }
    }
}

fn parse_pct_token(tok: &str) -> Option<f64> {
    let num = tok.strip_suffix('%')?;
    let v: f64 = num.trim().parse().ok()?;
    (0.0..=100.0).contains(&v).then_some(v)
}

/// Whitespace split honouring single and double quotes.
fn split_command_line(s: &str) -> Result<Vec<String>> {
    let mut out = Vec::new();
    let mut cur = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;
    for c in s.chars() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), c) => cur.push(c),
            (None, '"' | '\'') => {
                quote = Some(c);
                in_word = true;
            }
            (None, c) if c.is_whitespace() => {
                if in_word {
                    out.push(std::mem::take(&mut cur));
                    in_word = false;
                }
            }
            (None, c) => {
                cur.push(c);
                in_word = true;
            }
        }
    }
    if quote.is_some() {
        return Err(MoveError::Validation(format!("unbalanced quote in copy command: '{s}'")));
    }
    if in_word {
        out.push(cur);
    }
    Ok(out)
}
