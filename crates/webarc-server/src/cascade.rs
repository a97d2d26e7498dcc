use std::path::{Path, PathBuf};

/// Where and how local lookups are made.
#[derive(Clone, Debug)]
pub struct CascadeConfig {
    /// Primary legacy web tree.
    pub htdocs_root: PathBuf,
    /// Subdirectories of the primary tree that shadow it, in win order.
    pub overrides: Vec<String>,
    /// Separate root for scripts shipped apart from content.
    pub script_root: PathBuf,
    /// Extensions routed to the CGI executor instead of static reads.
    pub script_extensions: Vec<String>,
    /// Index filenames tried for directory requests, in priority order.
    pub index_files: Vec<String>,
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self {
            htdocs_root: PathBuf::from("htdocs"),
            overrides: Vec::new(),
            script_root: PathBuf::from("cgi-bin"),
            script_extensions: vec!["php".into()],
            index_files: vec![
                "index.html".into(),
                "index.htm".into(),
                "index.php".into(),
                "index.swf".into(),
            ],
        }
    }
}

/// Ordered probing of candidate filesystem locations for a lookup key.
///
/// Override directories shadow the primary tree, in configuration order.
/// Probing is strictly sequential and only regular files count as hits;
/// directories are reachable solely through the index-file candidates.
pub struct Cascade {
    config: CascadeConfig,
}

impl Cascade {
    pub fn new(config: CascadeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CascadeConfig {
        &self.config
    }

    /// Whether `key` addresses a server-side script by extension.
    pub fn is_script(&self, key: &str) -> bool {
        let stripped = strip_query(key);
        match stripped.rsplit_once('.') {
            Some((_, ext)) => self.is_script_extension(ext),
            None => false,
        }
    }

    /// Whether a resolved candidate is a script. Checked on the winning
    /// path, not the lookup key: a directory request may resolve through
    /// an index candidate to a script file.
    pub fn is_script_path(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.is_script_extension(ext))
    }

    fn is_script_extension(&self, ext: &str) -> bool {
        self.config
            .script_extensions
            .iter()
            .any(|e| e.eq_ignore_ascii_case(ext))
    }

    /// Build the full candidate list for `key`, in probe order.
    ///
    /// Keys whose safe-join fails (traversal attempts) contribute no
    /// candidates for the offending location.
    pub fn candidates(&self, key: &str) -> Vec<PathBuf> {
        let stripped = strip_query(key);
        // The raw key first: legacy trees sometimes store files whose
        // names embed the query suffix verbatim.
        let mut variants = vec![key];
        if stripped != key {
            variants.push(stripped);
        }

        let mut out = Vec::new();
        for location in self.locations() {
            for variant in &variants {
                self.push_candidate(&mut out, &location, variant);
            }
        }
        if self.is_script(stripped) {
            for variant in &variants {
                self.push_candidate(&mut out, &self.config.script_root, variant);
            }
        }
        for index in &self.config.index_files {
            let with_index = if stripped.is_empty() {
                index.clone()
            } else {
                format!("{}/{index}", stripped.trim_end_matches('/'))
            };
            for location in self.locations() {
                self.push_candidate(&mut out, &location, &with_index);
            }
        }
        out
    }

    /// Probe candidates in order; the first existing regular file wins.
    pub async fn resolve(&self, key: &str) -> Option<PathBuf> {
        for candidate in self.candidates(key) {
            match tokio::fs::metadata(&candidate).await {
                Ok(meta) if meta.is_file() => {
                    tracing::debug!(key, path = %candidate.display(), "cascade hit");
                    return Some(candidate);
                }
                _ => {}
            }
        }
        None
    }

    /// Override directories in configuration order, then the primary tree.
    fn locations(&self) -> impl Iterator<Item = PathBuf> + '_ {
        self.config
            .overrides
            .iter()
            .map(|name| self.config.htdocs_root.join(name))
            .chain(std::iter::once(self.config.htdocs_root.clone()))
    }

    fn push_candidate(&self, out: &mut Vec<PathBuf>, root: &Path, relative: &str) {
        match webarc_fs::safe_join(root, relative) {
            Ok(path) => out.push(path),
            Err(e) => {
                tracing::warn!(root = %root.display(), relative, error = %e, "rejecting candidate");
            }
        }
    }
}

fn strip_query(key: &str) -> &str {
    match key.split_once('?') {
        Some((path, _)) => path,
        None => key,
    }
}
