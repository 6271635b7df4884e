//! Provenance of a directive's effective text.
//!
//! A dump line is produced either directly by a configuration file or by a
//! chain of nested macro expansions. [`Context`] records that chain from the
//! innermost macro (the one whose body holds the directive) up to the file
//! that issued the outermost `Use`.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;

/// A bare line reference, as parsed from the `used on line N` part of an
/// annotation before the chain is stitched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRef {
    pub line_num: Option<u32>,
}

/// Line `line_num` of `file_path` in the original (non-expanded) tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileContext {
    pub line_num: Option<u32>,
    pub file_path: String,
}

/// One macro hop: the directive text comes from the body of `macro_name`,
/// declared at `definition` and invoked from `used_in`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MacroContext {
    /// Offset inside the macro body. Back-filled while stitching, then
    /// possibly overwritten by a `# N:` instruction annotation.
    pub line_num: Option<u32>,
    pub macro_name: String,
    pub definition: FileContext,
    pub used_in: Context,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Context {
    Line(LineRef),
    File(FileContext),
    Macro(Box<MacroContext>),
}

static CONF_PREFIX_RE: OnceLock<Regex> = OnceLock::new();

impl FileContext {
    pub fn new(line_num: Option<u32>, file_path: impl Into<String>) -> Self {
        Self {
            line_num,
            file_path: file_path.into(),
        }
    }

    /// Maps the path reported by the dump onto the configuration tree rooted
    /// at `config_root`. Everything up to the last `conf/` segment is replaced
    /// by `<config_root>/conf/`. Paths without such a segment are returned
    /// unchanged.
    ///
    /// # Example
    /// ```
    /// use ir::FileContext;
    /// use std::path::Path;
    /// let ctx = FileContext::new(Some(3), "/etc/httpd/conf/extra/waf.conf");
    /// let real = ctx.to_real_path(Path::new("/srv/site"));
    /// assert_eq!(real, Path::new("/srv/site/conf/extra/waf.conf"));
    /// ```
    pub fn to_real_path(&self, config_root: &Path) -> PathBuf {
        let re = CONF_PREFIX_RE
            .get_or_init(|| Regex::new(r"^.*conf/").expect("valid conf prefix regex"));
        let normalized = self.file_path.replace('\\', "/");
        let Some(m) = re.find(&normalized) else {
            return normalize(Path::new(&normalized));
        };
        let rest = &normalized[m.end()..];
        normalize(&config_root.join("conf").join(rest))
    }
}

/// Lexical normalisation (`.` and `..` removal) without touching the disk.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

impl MacroContext {
    pub fn new(macro_name: impl Into<String>, definition: FileContext, used_in: Context) -> Self {
        Self {
            line_num: None,
            macro_name: macro_name.into(),
            definition,
            used_in,
        }
    }
}

impl Context {
    pub fn line_num(&self) -> Option<u32> {
        match self {
            Context::Line(l) => l.line_num,
            Context::File(f) => f.line_num,
            Context::Macro(m) => m.line_num,
        }
    }

    pub fn set_line_num(&mut self, line_num: Option<u32>) {
        match self {
            Context::Line(l) => l.line_num = line_num,
            Context::File(f) => f.line_num = line_num,
            Context::Macro(m) => m.line_num = line_num,
        }
    }

    /// Number of macro hops between the directive and its file origin.
    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut ptr = self;
        while let Context::Macro(m) = ptr {
            depth += 1;
            ptr = &m.used_in;
        }
        depth
    }

    /// The context at the end of the `used_in` chain.
    pub fn root(&self) -> &Context {
        let mut ptr = self;
        while let Context::Macro(m) = ptr {
            ptr = &m.used_in;
        }
        ptr
    }

    /// Multi-line rendering used by trace output, innermost hop first.
    pub fn pretty(&self) -> String {
        match self {
            Context::Line(_) | Context::File(_) => self.to_string(),
            Context::Macro(m) => format!(
                "\"{}\" : {}\n{}",
                m.macro_name,
                m.definition,
                m.used_in.pretty()
            ),
        }
    }
}

impl fmt::Display for LineRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}", DisplayLine(self.line_num))
    }
}

impl fmt::Display for FileContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file_path, DisplayLine(self.line_num))
    }
}

impl fmt::Display for MacroContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(line) = self.line_num {
            write!(f, "line {line} of ")?;
        }
        write!(
            f,
            "[{}]({}) used on line {} of {}",
            self.macro_name,
            self.definition,
            DisplayLine(self.used_in.line_num()),
            self.used_in
        )
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Context::Line(l) => l.fmt(f),
            Context::File(c) => c.fmt(f),
            Context::Macro(m) => m.fmt(f),
        }
    }
}

struct DisplayLine(Option<u32>);

impl fmt::Display for DisplayLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(n) => write!(f, "{n}"),
            None => f.write_str("?"),
        }
    }
}
