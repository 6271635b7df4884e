//! Single forward pass over an expanded configuration dump.

use ir::{Context, Diagnostics, Directive, FileContext, LineRef, MacroContext, WarningKind};
use regex::Regex;
use std::sync::OnceLock;
use tracing::{debug, warn};

use crate::directives::{DirectiveFactory, Scope};
use crate::error::{Error, Result};

struct Patterns {
    secrule: Regex,
    generic: Regex,
    vhost_open: Regex,
    vhost_close: Regex,
    location_open: Regex,
    location_close: Regex,
    if_open: Regex,
    if_close: Regex,
    file_flag: Regex,
    context: Regex,
    instruction: Regex,
}

static PATTERNS: OnceLock<Patterns> = OnceLock::new();

fn patterns() -> &'static Patterns {
    PATTERNS.get_or_init(|| Patterns {
        secrule: Regex::new(r"^\s*SecRule\s+(.*)").expect("valid SecRule regex"),
        generic: Regex::new(r"^\s*(?P<name>\w+)\s+(?P<args>.*)").expect("valid directive regex"),
        vhost_open: Regex::new(r"^\s*<VirtualHost\s+(.*?)>").expect("valid VirtualHost regex"),
        vhost_close: Regex::new(r"^\s*</VirtualHost>").expect("valid VirtualHost regex"),
        location_open: Regex::new(r"^[ \t]*<Location\s+(.*?)>").expect("valid Location regex"),
        location_close: Regex::new(r"^[ \t]*</Location>").expect("valid Location regex"),
        if_open: Regex::new(r"^[ \t]*<If\s+(.*?)>").expect("valid If regex"),
        if_close: Regex::new(r"^[ \t]*</If>").expect("valid If regex"),
        file_flag: Regex::new(r"^# In file:\s+(.*)").expect("valid file annotation regex"),
        context: Regex::new(
            r#"^(?:macro '(?P<name>.*?)' \(defined on line (?P<def_line>\d+) of "(?P<def_file>.*?)"\) used on line (?P<use_line>\d+) of "(?P<recursion>.*)"|"?(?P<file_path>(?:/|[A-Za-z]:[\\/]).*?)"?\s*$)"#,
        )
        .expect("valid context annotation regex"),
        instruction: Regex::new(r"^\s*#\s+(\d+):").expect("valid instruction regex"),
    })
}

/// Parses the text of a `# In file:` annotation into the stitched context
/// chain, innermost hop first. `None` when the text does not follow the
/// annotation grammar.
///
/// # Example
/// ```
/// use ir::Context;
/// use parsers::dump::parse_context_annotation;
/// let ctx = parse_context_annotation(
///     r#"macro 'inner' (defined on line 4 of "/c/conf/m.conf") used on line 2 of "macro 'outer' (defined on line 9 of "/c/conf/m.conf") used on line 30 of "/c/conf/site.conf"""#,
/// )
/// .unwrap();
/// assert_eq!(ctx.depth(), 2);
/// let Context::Macro(inner) = &ctx else { unreachable!() };
/// assert_eq!(inner.line_num, None);
/// assert_eq!(inner.used_in.line_num(), Some(2));
/// assert_eq!(inner.used_in.root().line_num(), Some(30));
/// ```
pub fn parse_context_annotation(text: &str) -> Option<Context> {
    let re = &patterns().context;
    let mut hops: Vec<(String, FileContext, u32)> = Vec::new();
    let mut rest = text.trim_end();
    let terminal = loop {
        let caps = re.captures(rest)?;
        if let Some(path) = caps.name("file_path") {
            let path = path.as_str().trim_end_matches('"');
            break FileContext::new(None, path);
        }
        let def_line = caps["def_line"].parse().ok()?;
        let use_line = caps["use_line"].parse().ok()?;
        hops.push((
            caps["name"].to_string(),
            FileContext::new(Some(def_line), &caps["def_file"]),
            use_line,
        ));
        rest = caps.name("recursion")?.as_str();
    };

    // Link outermost to innermost; each hop's use line becomes the line
    // number of the context it was used in.
    let mut ctx = Context::File(terminal);
    for (name, definition, use_line) in hops.into_iter().rev() {
        ctx.set_line_num(Some(use_line));
        ctx = Context::Macro(Box::new(MacroContext::new(name, definition, ctx)));
    }
    Some(ctx)
}

/// Mutable state of one pass over a dump.
#[derive(Debug)]
pub struct DumpParser {
    virtual_host: String,
    location: String,
    conditions: Vec<String>,
    context: Option<Context>,
    next_node_id: u64,
    line_no: usize,
}

impl Default for DumpParser {
    fn default() -> Self {
        Self::new()
    }
}

impl DumpParser {
    pub fn new() -> Self {
        Self {
            virtual_host: String::new(),
            location: String::new(),
            conditions: Vec::new(),
            context: None,
            next_node_id: 1,
            line_no: 0,
        }
    }

    /// Number of directives emitted so far.
    pub fn emitted(&self) -> u64 {
        self.next_node_id - 1
    }

    pub fn current_context(&self) -> Option<&Context> {
        self.context.as_ref()
    }

    /// Consumes the next dump line and returns the directive it holds, if
    /// any.
    pub fn feed_line(
        &mut self,
        raw: &str,
        factory: &mut DirectiveFactory,
        diag: &mut Diagnostics,
    ) -> Result<Option<Directive>> {
        self.line_no += 1;
        let line = raw.trim_end_matches(['\r', '\n']);
        let p = patterns();

        if let Some(c) = p.vhost_open.captures(line) {
            self.virtual_host = c[1].to_string();
            self.location.clear();
            self.conditions.clear();
            return Ok(None);
        }
        if p.vhost_close.is_match(line) {
            self.virtual_host.clear();
            return Ok(None);
        }
        if let Some(c) = p.location_open.captures(line) {
            self.location = c[1].to_string();
            return Ok(None);
        }
        if p.location_close.is_match(line) {
            self.location.clear();
            return Ok(None);
        }
        if let Some(c) = p.if_open.captures(line) {
            self.conditions.push(c[1].to_string());
            return Ok(None);
        }
        if p.if_close.is_match(line) {
            if self.conditions.pop().is_none() {
                return Err(Error::UnbalancedIf { line: self.line_no });
            }
            return Ok(None);
        }
        if let Some(c) = p.file_flag.captures(line) {
            let ctx = parse_context_annotation(&c[1]).ok_or_else(|| Error::Annotation {
                line: self.line_no,
                text: c[1].to_string(),
            })?;
            debug!(line = self.line_no, context = %ctx, "Context annotation");
            self.context = Some(ctx);
            return Ok(None);
        }
        if let Some(c) = p.instruction.captures(line) {
            let ctx = self
                .context
                .as_mut()
                .ok_or(Error::InstructionWithoutContext { line: self.line_no })?;
            ctx.set_line_num(c[1].parse().ok());
            return Ok(None);
        }

        let (kind, args) = if let Some(c) = p.secrule.captures(line) {
            ("SecRule", c.get(1).map_or("", |m| m.as_str()))
        } else if let Some(c) = p.generic.captures(line) {
            (
                c.name("name").map_or("", |m| m.as_str()),
                c.name("args").map_or("", |m| m.as_str()),
            )
        } else {
            return Ok(None);
        };

        let node_id = self.next_node_id;
        self.next_node_id += 1;
        let context = match &self.context {
            Some(ctx) => ctx.clone(),
            None => {
                warn!(line = self.line_no, node_id, "Directive without context annotation");
                diag.warn(
                    WarningKind::MissingContext,
                    Some(node_id),
                    format!("dump line {} precedes any `# In file:` annotation", self.line_no),
                );
                Context::Line(LineRef { line_num: None })
            }
        };
        let scope = Scope {
            location: &self.location,
            virtual_host: &self.virtual_host,
            if_level: self.conditions.len() as u32,
            conditions: &self.conditions,
        };
        factory
            .create(&scope, &context, node_id, kind, args, self.line_no, diag)
            .map(Some)
    }
}

/// Parses a whole dump held in memory.
pub fn parse_dump(
    text: &str,
    factory: &mut DirectiveFactory,
    diag: &mut Diagnostics,
) -> Result<Vec<Directive>> {
    let mut parser = DumpParser::new();
    let mut out = Vec::new();
    for line in text.lines() {
        if let Some(d) = parser.feed_line(line, factory, diag)? {
            out.push(d);
        }
    }
    debug!(directives = out.len(), "Dump parsed");
    Ok(out)
}
