//! Symbol map for one release
//!
//! Parses a ProGuard-style mapping document into a lookup table from stable
//! symbolic names to the mangled identifiers used inside one release of the
//! target binary.
//!
//! # Format
//!
//! ```text
//! # comment
//! net.minecraft.server.MinecraftServer -> bx:
//!     boolean isReady -> ac
//!     12:40:net.minecraft.world.level.Level getLevel(net.minecraft.resources.ResourceKey) -> a
//! ```
//!
//! Unindented lines declare a code unit, indented lines declare its fields
//! and methods. Anything else is skipped.

use crate::release::ReleaseId;
use crate::symbol::Symbol;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

static FIELD_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s+([a-zA-Z0-9_$.]+(?:\[\])*) ([$a-zA-Z0-9_]+) -> ([a-zA-Z0-9_$]+)$")
        .expect("field pattern is valid")
});

static METHOD_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^\s+(?:\d+:\d+:)?([a-zA-Z0-9_$.]+(?:\[\])*) ([a-zA-Z0-9_$<>]+)\(([a-zA-Z0-9_$.,\[\]]*)\) -> ([a-zA-Z0-9_$<>]+)$",
    )
    .expect("method pattern is valid")
});

/// Symbol absent from the mapping of a release
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("no mapping for {} {symbol} in release {release}", symbol.kind())]
pub struct MappingNotFound {
    /// Symbol that was looked up
    pub symbol: Symbol,
    /// Release whose mapping was consulted
    pub release: ReleaseId,
}

/// Failure to read a mapping document
#[derive(Debug, thiserror::Error)]
pub enum MapError {
    /// Underlying read failed
    #[error("failed to read mapping {path}: {source}")]
    Io {
        /// Document path, or `<stream>` for readers
        path: PathBuf,
        /// IO error
        #[source]
        source: std::io::Error,
    },
}

impl MapError {
    /// Create IO error for path
    #[inline]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct MethodKey {
    name: String,
    params: Vec<String>,
}

#[derive(Debug, Clone, Default)]
struct CodeUnit {
    mangled: String,
    fields: HashMap<String, String>,
    methods: HashMap<MethodKey, String>,
}

/// Immutable symbolic-to-mangled lookup table for one release
#[derive(Debug, Clone)]
pub struct SymbolMap {
    release: ReleaseId,
    units: HashMap<String, CodeUnit>,
}

impl SymbolMap {
    /// Parse mapping document from a buffered reader
    ///
    /// # Errors
    /// Returns [`MapError::Io`] if the reader fails.
    pub fn parse<R: BufRead>(release: ReleaseId, reader: R) -> Result<Self, MapError> {
        let mut parser = Parser::default();
        for line in reader.lines() {
            let line = line.map_err(|e| MapError::io("<stream>", e))?;
            parser.line(&line);
        }
        Ok(parser.finish(release))
    }

    /// Parse mapping document held in memory
    #[must_use]
    pub fn parse_str(release: ReleaseId, text: &str) -> Self {
        let mut parser = Parser::default();
        for line in text.lines() {
            parser.line(line);
        }
        parser.finish(release)
    }

    /// Load mapping document from disk
    ///
    /// # Errors
    /// Returns [`MapError::Io`] naming the path if it cannot be read.
    pub fn load(release: ReleaseId, path: impl AsRef<Path>) -> Result<Self, MapError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| MapError::io(path, e))?;
        let mut parser = Parser::default();
        for line in BufReader::new(file).lines() {
            let line = line.map_err(|e| MapError::io(path, e))?;
            parser.line(&line);
        }
        let map = parser.finish(release);
        tracing::debug!(
            path = %path.display(),
            release = %map.release,
            types = map.units.len(),
            "loaded symbol map"
        );
        Ok(map)
    }

    /// Release this map belongs to
    #[inline]
    #[must_use]
    pub fn release(&self) -> &ReleaseId {
        &self.release
    }

    /// Number of code units declared
    #[inline]
    #[must_use]
    pub fn type_count(&self) -> usize {
        self.units.len()
    }

    /// Check whether a code unit is declared
    #[inline]
    #[must_use]
    pub fn contains_type(&self, name: &str) -> bool {
        self.units.contains_key(name)
    }

    /// Resolve a code unit display name to its mangled name
    ///
    /// # Errors
    /// Returns [`MappingNotFound`] naming the type and release.
    pub fn resolve_type(&self, name: &str) -> Result<&str, MappingNotFound> {
        self.units
            .get(name)
            .map(|unit| unit.mangled.as_str())
            .ok_or_else(|| self.missing(Symbol::ty(name)))
    }

    /// Resolve a field of a code unit to its mangled name
    ///
    /// # Errors
    /// Returns [`MappingNotFound`] if either the owner or the field is absent.
    pub fn resolve_field(&self, owner: &str, name: &str) -> Result<&str, MappingNotFound> {
        self.units
            .get(owner)
            .and_then(|unit| unit.fields.get(name))
            .map(String::as_str)
            .ok_or_else(|| self.missing(Symbol::field(owner, name)))
    }

    /// Resolve a method by name and ordered parameter types
    ///
    /// An empty `params` slice selects the zero-parameter overload.
    ///
    /// # Errors
    /// Returns [`MappingNotFound`] if no method with exactly this signature
    /// is declared on `owner`.
    pub fn resolve_method(
        &self,
        owner: &str,
        name: &str,
        params: &[&str],
    ) -> Result<&str, MappingNotFound> {
        let key = MethodKey {
            name: name.to_string(),
            params: params.iter().map(|p| (*p).to_string()).collect(),
        };
        self.units
            .get(owner)
            .and_then(|unit| unit.methods.get(&key))
            .map(String::as_str)
            .ok_or_else(|| self.missing(Symbol::method(owner, name, params)))
    }

    fn missing(&self, symbol: Symbol) -> MappingNotFound {
        MappingNotFound {
            symbol,
            release: self.release.clone(),
        }
    }
}

#[derive(Default)]
struct Parser {
    units: HashMap<String, CodeUnit>,
    current: Option<String>,
    skipped: usize,
}

impl Parser {
    fn line(&mut self, raw: &str) {
        let line = raw.trim_end_matches('\r');
        if line.trim().is_empty() || line.starts_with('#') {
            return;
        }

        if !line.starts_with(char::is_whitespace) {
            self.unit(line);
            return;
        }

        let Some(owner) = self.current.as_ref() else {
            self.skip(line);
            return;
        };

        if let Some(caps) = FIELD_LINE.captures(line) {
            let unit = self.units.entry(owner.clone()).or_default();
            unit.fields.insert(caps[2].to_string(), caps[3].to_string());
        } else if let Some(caps) = METHOD_LINE.captures(line) {
            let params = caps[3]
                .split(',')
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect();
            let key = MethodKey {
                name: caps[2].to_string(),
                params,
            };
            let unit = self.units.entry(owner.clone()).or_default();
            unit.methods.insert(key, caps[4].to_string());
        } else {
            self.skip(line);
        }
    }

    fn unit(&mut self, line: &str) {
        let Some((display, mangled)) = line.split_once(" -> ") else {
            self.current = None;
            self.skip(line);
            return;
        };
        let display = display.trim().to_string();
        let mangled = mangled.trim().trim_end_matches(':').to_string();
        self.units.entry(display.clone()).or_default().mangled = mangled;
        self.current = Some(display);
    }

    fn skip(&mut self, line: &str) {
        self.skipped += 1;
        tracing::trace!(line, "skipping unrecognized mapping line");
    }

    fn finish(self, release: ReleaseId) -> SymbolMap {
        if self.skipped > 0 {
            tracing::debug!(%release, skipped = self.skipped, "mapping lines skipped");
        }
        SymbolMap {
            release,
            units: self.units,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SAMPLE: &str = "\
# compiler: R8
# pg_map_id: 1
net.minecraft.server.MinecraftServer -> bx:
    boolean isReady -> ac
    java.lang.String[] args -> b
    1:1:void <init>() -> <init>
    44:50:net.minecraft.world.level.Level getLevel(net.minecraft.resources.ResourceKey) -> a
    void tick() -> d
    void tick(int,boolean) -> e
net.minecraft.world.level.Level -> cc:
    net.minecraft.resources.ResourceKey OVERWORLD -> f
    12:18:net.minecraft.world.level.chunk.ChunkAccess getChunk(int,int) -> d
";

    fn sample() -> SymbolMap {
        SymbolMap::parse_str(ReleaseId::new("20w22a"), SAMPLE)
    }

    #[test]
    fn resolve_type_returns_mangled_without_colon() {
        let map = sample();
        assert_eq!(map.resolve_type("net.minecraft.server.MinecraftServer"), Ok("bx"));
        assert_eq!(map.resolve_type("net.minecraft.world.level.Level"), Ok("cc"));
        assert_eq!(map.type_count(), 2);
    }

    #[test]
    fn resolve_field() {
        let map = sample();
        assert_eq!(
            map.resolve_field("net.minecraft.server.MinecraftServer", "isReady"),
            Ok("ac")
        );
        assert_eq!(
            map.resolve_field("net.minecraft.server.MinecraftServer", "args"),
            Ok("b")
        );
        assert_eq!(
            map.resolve_field("net.minecraft.world.level.Level", "OVERWORLD"),
            Ok("f")
        );
    }

    #[test]
    fn resolve_method_with_line_prefix_and_params() {
        let map = sample();
        assert_eq!(
            map.resolve_method("net.minecraft.world.level.Level", "getChunk", &["int", "int"]),
            Ok("d")
        );
        assert_eq!(
            map.resolve_method(
                "net.minecraft.server.MinecraftServer",
                "getLevel",
                &["net.minecraft.resources.ResourceKey"]
            ),
            Ok("a")
        );
    }

    #[test]
    fn resolve_method_distinguishes_overloads() {
        let map = sample();
        let owner = "net.minecraft.server.MinecraftServer";
        assert_eq!(map.resolve_method(owner, "tick", &[]), Ok("d"));
        assert_eq!(map.resolve_method(owner, "tick", &["int", "boolean"]), Ok("e"));
        assert!(map.resolve_method(owner, "tick", &["int"]).is_err());
    }

    #[test]
    fn missing_symbol_names_symbol_and_release() {
        let map = sample();
        let err = map
            .resolve_field("net.minecraft.server.MinecraftServer", "running")
            .unwrap_err();
        assert_eq!(err.symbol, Symbol::field("net.minecraft.server.MinecraftServer", "running"));
        assert_eq!(err.release, ReleaseId::new("20w22a"));
        let message = err.to_string();
        assert!(message.contains("MinecraftServer#running"));
        assert!(message.contains("20w22a"));
    }

    #[test]
    fn missing_type() {
        let err = sample().resolve_type("a.Missing").unwrap_err();
        assert_eq!(err.symbol, Symbol::ty("a.Missing"));
    }

    #[test]
    fn skips_malformed_and_orphan_lines() {
        let text = "    int orphan -> a\nnot a declaration\n    int x -> y\nfoo.Bar -> q:\n    ??? -> !\n    int count -> c\n";
        let map = SymbolMap::parse_str(ReleaseId::new("1.14.4"), text);
        assert_eq!(map.type_count(), 1);
        assert_eq!(map.resolve_field("foo.Bar", "count"), Ok("c"));
    }

    #[test]
    fn later_declaration_replaces_earlier() {
        let text = "a.B -> x:\n    int f -> p\n    int f -> q\n";
        let map = SymbolMap::parse_str(ReleaseId::new("r"), text);
        assert_eq!(map.resolve_field("a.B", "f"), Ok("q"));
    }

    #[test]
    fn parse_from_reader_handles_crlf() {
        let text = "a.B -> x:\r\n    int f -> p\r\n";
        let map = SymbolMap::parse(ReleaseId::new("r"), text.as_bytes()).unwrap();
        assert_eq!(map.resolve_type("a.B"), Ok("x"));
        assert_eq!(map.resolve_field("a.B", "f"), Ok("p"));
    }

    #[test]
    fn load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.txt");
        std::fs::write(&path, SAMPLE).unwrap();
        let map = SymbolMap::load(ReleaseId::new("20w22a"), &path).unwrap();
        assert!(map.contains_type("net.minecraft.world.level.Level"));
    }

    #[test]
    fn load_missing_file_names_path() {
        let err = SymbolMap::load(ReleaseId::new("r"), "/nonexistent/mapping.txt").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/mapping.txt"));
    }
}
