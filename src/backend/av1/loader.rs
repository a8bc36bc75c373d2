// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright © 2023 Adrian <adrian.eddy at gmail>

use std::collections::HashMap;
use std::ffi::c_void;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock};

use parking_lot::Mutex;

use super::ffi::*;
use crate::types::{Av1Symbol, RateControlError};

/// An opened shared library.
pub trait LoadedLibrary: Send + Sync {
    /// Address of the exported `name`, `None` when it is not exported.
    fn symbol(&self, name: &str) -> Option<*mut c_void>;
}

/// Opens shared libraries. Swapped out in tests to count opens or to serve
/// an in-process symbol table.
pub trait LibraryOpener: Send + Sync {
    fn open(&self, path: &Path) -> Result<Box<dyn LoadedLibrary>, String>;
}

/// Opens libraries through the platform loader.
#[derive(Debug, Default, Clone, Copy)]
pub struct DlOpener;

struct DynamicLibrary(libloading::Library);

impl LoadedLibrary for DynamicLibrary {
    fn symbol(&self, name: &str) -> Option<*mut c_void> {
        // SAFETY: the address is only read here. Callers cast it to the
        // matching `extern "C"` signature from `ffi`.
        let address = unsafe { self.0.get::<*mut c_void>(name.as_bytes()) }.ok().map(|s| *s)?;
        (!address.is_null()).then_some(address)
    }
}

impl LibraryOpener for DlOpener {
    fn open(&self, path: &Path) -> Result<Box<dyn LoadedLibrary>, String> {
        // SAFETY: loading runs the library's initializers. The path names an
        // aom build chosen by the embedding application.
        let lib = unsafe { libloading::Library::new(path) }.map_err(|e| e.to_string())?;
        Ok(Box::new(DynamicLibrary(lib)))
    }
}

/// The resolved AV1 entry points. Keeps its library loaded for as long as
/// any controller holds it.
pub struct Av1Library {
    path: PathBuf,
    pub(crate) init_config: av1_ratecontrol_rtc_init_ratecontrol_config_fn,
    pub(crate) create: av1_ratecontrol_rtc_create_fn,
    pub(crate) update: av1_ratecontrol_rtc_update_fn,
    pub(crate) compute_qp: av1_ratecontrol_rtc_compute_qp_fn,
    pub(crate) get_qp: av1_ratecontrol_rtc_get_qp_fn,
    pub(crate) get_loop_filter_level: av1_ratecontrol_rtc_get_loop_filter_level_fn,
    pub(crate) post_encode_update: av1_ratecontrol_rtc_post_encode_update_fn,
    pub(crate) get_segmentation: av1_ratecontrol_rtc_get_segmentation_fn,
    pub(crate) get_cdef_info: av1_ratecontrol_rtc_get_cdef_info_fn,
    pub(crate) destroy: Option<av1_ratecontrol_rtc_destroy_fn>,
    _lib: Box<dyn LoadedLibrary>,
}

impl std::fmt::Debug for Av1Library {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Av1Library")
            .field("path", &self.path)
            .field("has_destroy", &self.destroy.is_some())
            .finish()
    }
}

impl Av1Library {
    /// Opens `path` and resolves every required entry point. Resolution stops
    /// at the first missing symbol and reports it.
    pub fn load(opener: &dyn LibraryOpener, path: &Path) -> Result<Self, RateControlError> {
        let lib = opener.open(path).map_err(|reason| RateControlError::BackendLibraryUnavailable {
            path: path.display().to_string(),
            reason,
        })?;

        let resolve = |symbol: Av1Symbol| lib.symbol(symbol.name()).ok_or(RateControlError::BackendSymbolMissing(symbol));

        // SAFETY: every address comes from the export of the same name and
        // the aliases in `ffi` mirror the C declarations of those exports.
        let library = unsafe {
            let init_config = std::mem::transmute::<*mut c_void, av1_ratecontrol_rtc_init_ratecontrol_config_fn>(resolve(Av1Symbol::InitConfig)?);
            let create = std::mem::transmute::<*mut c_void, av1_ratecontrol_rtc_create_fn>(resolve(Av1Symbol::CreateController)?);
            let update = std::mem::transmute::<*mut c_void, av1_ratecontrol_rtc_update_fn>(resolve(Av1Symbol::UpdateConfig)?);
            let compute_qp = std::mem::transmute::<*mut c_void, av1_ratecontrol_rtc_compute_qp_fn>(resolve(Av1Symbol::ComputeQp)?);
            let get_qp = std::mem::transmute::<*mut c_void, av1_ratecontrol_rtc_get_qp_fn>(resolve(Av1Symbol::GetQp)?);
            let get_loop_filter_level = std::mem::transmute::<*mut c_void, av1_ratecontrol_rtc_get_loop_filter_level_fn>(resolve(Av1Symbol::GetLoopFilterLevel)?);
            let post_encode_update = std::mem::transmute::<*mut c_void, av1_ratecontrol_rtc_post_encode_update_fn>(resolve(Av1Symbol::PostEncodeUpdate)?);
            let get_segmentation = std::mem::transmute::<*mut c_void, av1_ratecontrol_rtc_get_segmentation_fn>(resolve(Av1Symbol::GetSegmentationData)?);
            let get_cdef_info = std::mem::transmute::<*mut c_void, av1_ratecontrol_rtc_get_cdef_info_fn>(resolve(Av1Symbol::GetCdefInfo)?);
            let destroy = lib
                .symbol(AV1_RATECONTROL_RTC_DESTROY)
                .map(|address| std::mem::transmute::<*mut c_void, av1_ratecontrol_rtc_destroy_fn>(address));

            Self {
                path: path.to_path_buf(),
                init_config,
                create,
                update,
                compute_qp,
                get_qp,
                get_loop_filter_level,
                post_encode_update,
                get_segmentation,
                get_cdef_info,
                destroy,
                _lib: lib,
            }
        };
        if library.destroy.is_none() {
            log::warn!("{} does not export {AV1_RATECONTROL_RTC_DESTROY}, native controllers will not be freed", path.display());
        }
        Ok(library)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Process-wide table of loaded AV1 libraries, one entry per path.
///
/// A library is opened at most once per cache no matter how many controllers
/// use it. Failed loads are not remembered, the next use retries.
pub struct SymbolCache {
    opener: Box<dyn LibraryOpener>,
    libraries: Mutex<HashMap<PathBuf, Arc<Av1Library>>>,
    open_count: AtomicUsize,
}

static GLOBAL_CACHE: LazyLock<Arc<SymbolCache>> = LazyLock::new(|| Arc::new(SymbolCache::new(Box::new(DlOpener))));

impl SymbolCache {
    pub fn new(opener: Box<dyn LibraryOpener>) -> Self {
        Self { opener, libraries: Mutex::new(HashMap::new()), open_count: AtomicUsize::new(0) }
    }

    /// The cache shared by every controller that wasn't given its own.
    pub fn global() -> Arc<SymbolCache> {
        GLOBAL_CACHE.clone()
    }

    pub fn load(&self, path: &Path) -> Result<Arc<Av1Library>, RateControlError> {
        let mut libraries = self.libraries.lock();
        if let Some(library) = libraries.get(path) {
            return Ok(library.clone());
        }

        log::info!("Loading AV1 rate control library from {}", path.display());
        self.open_count.fetch_add(1, Ordering::SeqCst);
        let library = Arc::new(Av1Library::load(self.opener.as_ref(), path).inspect_err(|e| log::error!("{e}"))?);
        libraries.insert(path.to_path_buf(), library.clone());
        Ok(library)
    }

    /// Number of times the opener has been asked to open a library.
    pub fn open_count(&self) -> usize {
        self.open_count.load(Ordering::SeqCst)
    }

    pub fn is_loaded(&self, path: &Path) -> bool {
        self.libraries.lock().contains_key(path)
    }
}

impl std::fmt::Debug for SymbolCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymbolCache")
            .field("libraries", &self.libraries.lock().keys().collect::<Vec<_>>())
            .field("open_count", &self.open_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::c_int;

    unsafe extern "C" fn init_config(config: *mut AomAv1RateControlRtcConfig) {
        unsafe { (*config).max_quantizer = 63 };
    }
    unsafe extern "C" fn create(_: *const AomAv1RateControlRtcConfig) -> AomAv1RateControlRtcHandle { std::ptr::null_mut() }
    unsafe extern "C" fn update(_: AomAv1RateControlRtcHandle, _: *const AomAv1RateControlRtcConfig) -> bool { true }
    unsafe extern "C" fn compute_qp(_: AomAv1RateControlRtcHandle, _: *const AomAv1FrameParamsRtc) -> AomFrameDropDecision { AOM_FRAME_DROP_OK }
    unsafe extern "C" fn get_qp(_: AomAv1RateControlRtcHandle) -> c_int { 0 }
    unsafe extern "C" fn get_lf(_: AomAv1RateControlRtcHandle) -> AomAv1LoopfilterLevel { AomAv1LoopfilterLevel::default() }
    unsafe extern "C" fn post_encode(_: AomAv1RateControlRtcHandle, _: u64) {}
    unsafe extern "C" fn get_seg(_: AomAv1RateControlRtcHandle, _: *mut AomAv1SegmentationData) -> bool { false }
    unsafe extern "C" fn get_cdef(_: AomAv1RateControlRtcHandle) -> AomAv1CdefInfo { AomAv1CdefInfo::default() }

    fn exports() -> Vec<(Av1Symbol, usize)> {
        vec![
            (Av1Symbol::InitConfig, init_config as usize),
            (Av1Symbol::CreateController, create as usize),
            (Av1Symbol::UpdateConfig, update as usize),
            (Av1Symbol::ComputeQp, compute_qp as usize),
            (Av1Symbol::GetQp, get_qp as usize),
            (Av1Symbol::GetLoopFilterLevel, get_lf as usize),
            (Av1Symbol::PostEncodeUpdate, post_encode as usize),
            (Av1Symbol::GetSegmentationData, get_seg as usize),
            (Av1Symbol::GetCdefInfo, get_cdef as usize),
        ]
    }

    struct TableLibrary(HashMap<&'static str, usize>);

    impl LoadedLibrary for TableLibrary {
        fn symbol(&self, name: &str) -> Option<*mut c_void> {
            self.0.get(name).map(|&address| address as *mut c_void)
        }
    }

    struct TableOpener {
        missing: Option<Av1Symbol>,
    }

    impl LibraryOpener for TableOpener {
        fn open(&self, path: &Path) -> Result<Box<dyn LoadedLibrary>, String> {
            if path.to_str() == Some("missing.so") {
                return Err("no such file".into());
            }
            let table = exports()
                .into_iter()
                .filter(|(symbol, _)| Some(*symbol) != self.missing)
                .map(|(symbol, address)| (symbol.name(), address))
                .collect();
            Ok(Box::new(TableLibrary(table)))
        }
    }

    #[test]
    fn resolves_all_symbols() {
        let library = Av1Library::load(&TableOpener { missing: None }, Path::new("aom.so")).unwrap();
        assert!(library.destroy.is_none());
        let mut config = AomAv1RateControlRtcConfig::default();
        unsafe { (library.init_config)(&mut config) };
        assert_eq!(config.max_quantizer, 63);
    }

    #[test]
    fn reports_the_missing_symbol() {
        for missing in Av1Symbol::ALL {
            let err = Av1Library::load(&TableOpener { missing: Some(missing) }, Path::new("aom.so")).unwrap_err();
            match err {
                RateControlError::BackendSymbolMissing(symbol) => assert_eq!(symbol, missing),
                other => panic!("unexpected error {other:?}"),
            }
        }
    }

    #[test]
    fn open_failure_is_library_unavailable() {
        let err = Av1Library::load(&TableOpener { missing: None }, Path::new("missing.so")).unwrap_err();
        assert!(matches!(err, RateControlError::BackendLibraryUnavailable { .. }));
    }

    #[test]
    fn cache_opens_each_path_once() {
        let cache = SymbolCache::new(Box::new(TableOpener { missing: None }));
        let a = cache.load(Path::new("aom.so")).unwrap();
        let b = cache.load(Path::new("aom.so")).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.open_count(), 1);

        cache.load(Path::new("other/aom.so")).unwrap();
        assert_eq!(cache.open_count(), 2);
    }

    #[test]
    fn failed_loads_are_retried() {
        let cache = SymbolCache::new(Box::new(TableOpener { missing: Some(Av1Symbol::GetCdefInfo) }));
        assert!(cache.load(Path::new("aom.so")).is_err());
        assert!(cache.load(Path::new("aom.so")).is_err());
        assert_eq!(cache.open_count(), 2);
        assert!(!cache.is_loaded(Path::new("aom.so")));
    }

    #[cfg(all(target_os = "linux", target_env = "gnu"))]
    #[test]
    fn platform_loader_resolves_exports() {
        let libc = DlOpener.open(Path::new("libc.so.6")).unwrap();
        assert!(libc.symbol("malloc").is_some());
        assert!(libc.symbol(Av1Symbol::CreateController.name()).is_none());
        assert!(DlOpener.open(Path::new("/nowhere/libaom.so")).is_err());
    }
}
