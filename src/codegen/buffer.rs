use crate::format::CodeFormat;
use rustc_hash::FxHashSet;
use std::fmt;

/// Lines of generated code with their indentation level.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodeBuffer {
    lines: Vec<(usize, String)>,
    level: usize,
}

const INDENT: &str = "    ";

impl CodeBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a statement. Multi-line statements are split, every line receiving the
    /// current indentation.
    pub fn push(&mut self, statement: impl AsRef<str>) {
        for line in statement.as_ref().lines() {
            self.lines.push((self.level, line.to_string()));
        }
    }

    pub fn blank(&mut self) {
        if !matches!(self.lines.last(), Some((_, line)) if line.is_empty()) {
            self.lines.push((0, String::new()));
        }
    }

    pub fn indent(&mut self) {
        self.level += 1;
    }

    /// # Panics
    ///
    /// Panics when dedenting below the starting level.
    pub fn dedent(&mut self) {
        assert!(self.level > 0, "Unbalanced dedent in generated code.");
        self.level -= 1;
    }

    /// Appends all lines of another buffer, nested below the current indentation.
    pub fn append(&mut self, other: CodeBuffer) {
        let level = self.level;
        self.lines
            .extend(other.lines.into_iter().map(|(l, line)| match line.is_empty() {
                true => (0, line),
                false => (l + level, line),
            }));
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Removes declarations whose name is read neither by a later line nor by `readers`.
    ///
    /// Comments left without a statement below them and repeated blank lines go as well.
    pub fn remove_unused_declarations(&mut self, readers: &CodeBuffer, format: &impl CodeFormat) {
        let mut used: FxHashSet<String> = readers
            .lines
            .iter()
            .flat_map(|(_, line)| identifiers(line))
            .map(str::to_string)
            .collect();

        let mut kept: Vec<(usize, String)> = Vec::with_capacity(self.lines.len());
        for (level, line) in std::mem::take(&mut self.lines).into_iter().rev() {
            let before_gap = kept.last().map_or(true, |(_, next)| next.is_empty());
            let unused = match format.declared_name(&line) {
                Some(name) => !used.contains(&name),
                None => before_gap && (line.is_empty() || format.is_comment(&line)),
            };
            if unused {
                continue;
            }
            used.extend(identifiers(&line).map(str::to_string));
            kept.push((level, line));
        }
        while matches!(kept.last(), Some((_, line)) if line.is_empty()) {
            kept.pop();
        }
        kept.reverse();
        self.lines = kept;
    }
}

fn identifiers(line: &str) -> impl Iterator<Item = &str> {
    line.split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .filter(|token| !token.is_empty())
}

impl fmt::Display for CodeBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (level, line) in &self.lines {
            if line.is_empty() {
                writeln!(f)?;
            } else {
                writeln!(f, "{}{}", INDENT.repeat(*level), line)?;
            }
        }
        Ok(())
    }
}
