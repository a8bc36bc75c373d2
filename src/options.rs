// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright © 2023 Adrian <adrian.eddy at gmail>

use crate::backend::av1::loader::SymbolCache;
use crate::util::select_custom_option;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Default, Debug, Clone)]
pub struct ControllerOptions {
    /// Shared library holding the AV1 engine. Overrides `custom_options`.
    pub library_path: Option<PathBuf>,
    pub custom_options: HashMap<String, String>,
    /// Loader cache to resolve the AV1 library through. `None` uses the process-wide one.
    pub symbol_cache: Option<Arc<SymbolCache>>,
}

impl ControllerOptions {
    pub fn with_library_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.library_path = Some(path.into());
        self
    }

    pub fn with_symbol_cache(mut self, cache: Arc<SymbolCache>) -> Self {
        self.symbol_cache = Some(cache);
        self
    }

    pub(crate) fn av1_library_path(&self) -> PathBuf {
        if let Some(path) = &self.library_path {
            return path.clone();
        }
        if let Some(path) = select_custom_option(&self.custom_options, &["av1.library_path", "library_path"]) {
            return PathBuf::from(path);
        }
        PathBuf::from(default_av1_library_name())
    }

    pub(crate) fn symbol_cache(&self) -> Arc<SymbolCache> {
        self.symbol_cache.clone().unwrap_or_else(SymbolCache::global)
    }
}

pub fn default_av1_library_name() -> &'static str {
    if cfg!(target_os = "windows") {
        "aom.dll"
    } else if cfg!(any(target_os = "macos", target_os = "ios")) {
        "libaom.dylib"
    } else {
        "libaom.so"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn library_path_precedence() {
        let mut opts = ControllerOptions::default();
        assert_eq!(opts.av1_library_path(), PathBuf::from(default_av1_library_name()));

        opts.custom_options.insert("library_path".into(), "/opt/a.so".into());
        assert_eq!(opts.av1_library_path(), PathBuf::from("/opt/a.so"));

        opts.custom_options.insert("av1.library_path".into(), "/opt/b.so".into());
        assert_eq!(opts.av1_library_path(), PathBuf::from("/opt/b.so"));

        let opts = opts.with_library_path("/usr/local/lib/libaom.so");
        assert_eq!(opts.av1_library_path(), PathBuf::from("/usr/local/lib/libaom.so"));
    }
}
