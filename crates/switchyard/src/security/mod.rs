//! Validation applied before anything is loaded into the process.
//!
//! See [`path`] for the individual checks.

pub mod path;

pub use path::{
    RejectionReason, check_character_class, check_library_path, derive_symbol_name,
    language_from_library_name, native_library_extension, safe_backend_name, safe_language_name,
    safe_symbol_name, within_trusted_directory,
};
