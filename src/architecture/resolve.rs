//! Import resolution
//!
//! Maps a raw import target onto a module id from the analyzed set. Anything
//! that does not land on a known module (third-party packages, stdlib,
//! generated code) resolves to `None` and is dropped from the graph.

use crate::parsers::Language;
use rustc_hash::{FxHashMap, FxHashSet};

/// Lookup tables over the set of module ids
pub(super) struct ModuleIndex {
    ids: FxHashSet<String>,
    /// Every `/`-boundary suffix of every id, to the smallest id carrying it
    by_suffix: FxHashMap<String, String>,
    /// Every `/`-boundary suffix of every package dir, to its smallest module
    by_dir_suffix: FxHashMap<String, String>,
    /// Every directory name that holds modules, at any depth
    dir_names: FxHashSet<String>,
}

fn suffixes(path: &str) -> impl Iterator<Item = &str> {
    std::iter::once(path).chain(
        path.match_indices('/')
            .map(move |(i, _)| &path[i + 1..])
            .filter(|s| !s.is_empty()),
    )
}

fn insert_min(map: &mut FxHashMap<String, String>, key: &str, id: &str) {
    match map.get_mut(key) {
        Some(existing) if existing.as_str() <= id => {}
        Some(existing) => *existing = id.to_string(),
        None => {
            map.insert(key.to_string(), id.to_string());
        }
    }
}

/// Parent directory of a module id; empty for top-level modules
pub(super) fn package_of(id: &str) -> &str {
    id.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}

fn join(dir: &str, rest: &str) -> String {
    if dir.is_empty() {
        rest.to_string()
    } else if rest.is_empty() {
        dir.to_string()
    } else {
        format!("{}/{}", dir, rest)
    }
}

/// Collapse `.` and `..` segments. `None` when the path escapes the root.
fn normalize(path: &str) -> Option<String> {
    let mut parts: Vec<&str> = Vec::new();
    for seg in path.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            s => parts.push(s),
        }
    }
    Some(parts.join("/"))
}

impl ModuleIndex {
    pub(super) fn new<'a>(ids: impl IntoIterator<Item = &'a str>) -> Self {
        let mut index = Self {
            ids: FxHashSet::default(),
            by_suffix: FxHashMap::default(),
            by_dir_suffix: FxHashMap::default(),
            dir_names: FxHashSet::default(),
        };
        for id in ids {
            index.ids.insert(id.to_string());
            for suffix in suffixes(id) {
                insert_min(&mut index.by_suffix, suffix, id);
            }
            let dir = package_of(id);
            if !dir.is_empty() {
                for suffix in suffixes(dir) {
                    insert_min(&mut index.by_dir_suffix, suffix, id);
                }
                index.dir_names.extend(dir.split('/').map(str::to_string));
            }
        }
        index
    }

    fn exact(&self, candidate: &str) -> Option<String> {
        self.ids.get(candidate).cloned()
    }

    fn first_exact<I, S>(&self, candidates: I) -> Option<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        candidates.into_iter().find_map(|c| self.exact(c.as_ref()))
    }

    /// Resolve `target`, imported from module `from`.
    pub(super) fn resolve(&self, language: Language, from: &str, target: &str) -> Option<String> {
        let target = target.trim();
        if target.is_empty() {
            return None;
        }
        match language {
            Language::Python => self.resolve_python(from, target),
            Language::JavaScript | Language::TypeScript => self.resolve_js(from, target),
            Language::Rust => self.resolve_rust(from, target).into_iter().next(),
            Language::Go => self.resolve_go(target),
            Language::Java => self.resolve_java(target),
        }
    }

    /// Rust `use` trees can name several modules at once
    pub(super) fn resolve_all(&self, language: Language, from: &str, target: &str) -> Vec<String> {
        match language {
            Language::Rust => self.resolve_rust(from, target.trim()),
            _ => self.resolve(language, from, target).into_iter().collect(),
        }
    }

    fn resolve_python(&self, from: &str, target: &str) -> Option<String> {
        self.resolve_python_module(from, target).or_else(|| {
            // `from pkg import name` where name is not a submodule
            let (parent, _) = target.rsplit_once('.')?;
            if parent.chars().all(|c| c == '.') {
                // `from . import x` falls back to the package itself
                let mut base = package_of(from).to_string();
                for _ in 0..parent.len() {
                    base = package_of(&base).to_string();
                }
                return self.exact(&join(&base, "__init__"));
            }
            self.resolve_python_module(from, parent)
        })
    }

    fn resolve_python_module(&self, from: &str, target: &str) -> Option<String> {
        let dots = target.chars().take_while(|c| *c == '.').count();
        let rest = target[dots..].replace('.', "/");

        if dots > 0 {
            let mut base = package_of(from).to_string();
            for _ in 1..dots {
                base = package_of(&base).to_string();
            }
            let path = join(&base, &rest);
            return self.first_exact([path.clone(), join(&path, "__init__")]);
        }

        if let Some(found) = self.first_exact([rest.clone(), join(&rest, "__init__")]) {
            return Some(found);
        }
        // src layouts: `pkg.util` for `src/pkg/util`, but only when `pkg`
        // names a directory here, so `json` never lands on `app/json`
        let (head, _) = rest.split_once('/')?;
        if !self.dir_names.contains(head) {
            return None;
        }
        self.by_suffix
            .get(&rest)
            .or_else(|| self.by_suffix.get(&join(&rest, "__init__")))
            .cloned()
    }

    fn resolve_js(&self, from: &str, target: &str) -> Option<String> {
        if !(target.starts_with("./") || target.starts_with("../") || target == "." || target == "..") {
            return None;
        }
        let path = normalize(&join(package_of(from), target))?;
        let stem = crate::parsers::module_id(&path);
        self.first_exact([path.clone(), stem, join(&path, "index")])
    }

    /// Directory whose files are children of the module `id`
    fn rust_module_dir(id: &str) -> String {
        let name = id.rsplit('/').next().unwrap_or(id);
        if matches!(name, "mod" | "lib" | "main") {
            package_of(id).to_string()
        } else {
            id.to_string()
        }
    }

    fn rust_crate_root(from: &str) -> String {
        let mut root = String::new();
        let mut walked = String::new();
        for seg in package_of(from).split('/').filter(|s| !s.is_empty()) {
            walked = join(&walked, seg);
            if seg == "src" {
                root = walked.clone();
            }
        }
        root
    }

    /// Longest existing module along a `::` path below `base`
    fn rust_path(&self, base: &str, segments: &[&str]) -> Option<String> {
        for len in (1..=segments.len()).rev() {
            let path = join(base, &segments[..len].join("/"));
            if let Some(found) = self.first_exact([path.clone(), join(&path, "mod")]) {
                return Some(found);
            }
        }
        None
    }

    fn expand_use_tree(target: &str) -> Vec<String> {
        match (target.find('{'), target.rfind('}')) {
            (Some(open), Some(close)) if open < close => {
                let prefix = &target[..open];
                let mut out = Vec::new();
                let mut depth = 0usize;
                let mut start = open + 1;
                let inner_end = close;
                for (i, c) in target[open + 1..inner_end].char_indices() {
                    let at = open + 1 + i;
                    match c {
                        '{' => depth += 1,
                        '}' => depth = depth.saturating_sub(1),
                        ',' if depth == 0 => {
                            out.push(format!("{}{}", prefix, target[start..at].trim()));
                            start = at + 1;
                        }
                        _ => {}
                    }
                }
                out.push(format!("{}{}", prefix, target[start..inner_end].trim()));
                out.into_iter()
                    .filter(|s| !s.ends_with("::"))
                    .flat_map(|s| Self::expand_use_tree(&s))
                    .collect()
            }
            _ => vec![target.to_string()],
        }
    }

    fn resolve_rust(&self, from: &str, target: &str) -> Vec<String> {
        if let Some(name) = target.strip_prefix("mod ") {
            let dir = Self::rust_module_dir(from);
            let path = join(&dir, name.trim());
            return self
                .first_exact([path.clone(), join(&path, "mod")])
                .into_iter()
                .collect();
        }

        let mut resolved: Vec<String> = Self::expand_use_tree(target)
            .iter()
            .filter_map(|path| {
                let path = path.split(" as ").next().unwrap_or(path).trim();
                let segments: Vec<&str> = path
                    .split("::")
                    .filter(|s| !s.is_empty() && *s != "*" && *s != "self")
                    .collect();
                let (&head, rest) = segments.split_first()?;
                match head {
                    "crate" => self.rust_path(&Self::rust_crate_root(from), rest),
                    "super" => {
                        let mut dir = package_of(&Self::rust_module_dir(from)).to_string();
                        let mut rest = rest;
                        while let Some((&"super", tail)) = rest.split_first() {
                            dir = package_of(&dir).to_string();
                            rest = tail;
                        }
                        self.rust_path(&dir, rest)
                    }
                    _ if path.starts_with("self::") => {
                        self.rust_path(&Self::rust_module_dir(from), &segments)
                    }
                    _ => self.rust_path(&Self::rust_crate_root(from), &segments),
                }
            })
            .collect();
        resolved.sort();
        resolved.dedup();
        resolved
    }

    /// Longest package-dir suffix of the import path that exists.
    ///
    /// A suffix must span two segments, except below a hosted module root
    /// (`host.tld/owner/repo/pkg`). A lone last segment would send `net/http`
    /// to any `*/http` package here.
    fn resolve_go(&self, target: &str) -> Option<String> {
        let target = target.trim_end_matches('/');
        let segments: Vec<&str> = target.split('/').collect();
        let hosted = segments.first().is_some_and(|s| s.contains('.'));
        (0..segments.len()).find_map(|skip| {
            let matched = segments.len() - skip;
            if matched < 2 && !(hosted && skip >= 3) {
                return None;
            }
            self.by_dir_suffix.get(&segments[skip..].join("/")).cloned()
        })
    }

    fn resolve_java(&self, target: &str) -> Option<String> {
        if let Some(package) = target.strip_suffix(".*") {
            return self.by_dir_suffix.get(&package.replace('.', "/")).cloned();
        }
        let path = target.replace('.', "/");
        self.by_suffix.get(&path).cloned().or_else(|| {
            // static member imports name a class one segment up
            let (class, _) = path.rsplit_once('/')?;
            self.by_suffix.get(class).cloned()
        })
    }
}
