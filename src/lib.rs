// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright © 2023 Adrian <adrian.eddy at gmail>

pub mod backend;
pub mod layers;
mod controller;
mod options;
mod types;
mod util;
pub use types::*;
pub use controller::*;
pub use options::*;
pub use backend::{BackendFactory, RateControllerBackend, RateControllerInterface};
pub use backend::av1::loader::{Av1Library, DlOpener, LibraryOpener, LoadedLibrary, SymbolCache};
