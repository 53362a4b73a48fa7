//! FFI bindings for the mobility engine
//!
//! This module provides C-compatible functions for calling the engine from the
//! host app. All functions use C strings (null-terminated) and return allocated
//! memory that must be freed by the caller using `mobility_free_string`.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use crate::collector::{BufferConfig, MemoryStore, SampleBuffers, SampleCollector};
use crate::config::EngineConfig;
use crate::error::ComputeError;
use crate::pipeline::{compute_day_json, MobilityEngine};
use crate::types::{DayResult, DaySamples};

// Thread-local storage for the last error message
thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

/// Set the last error message
fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

/// Clear the last error message
fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

/// Helper to convert C string to Rust string
unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

/// Helper to convert Rust string to C string (caller must free)
fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

fn result_to_cstr(result: Result<DayResult, ComputeError>) -> *mut c_char {
    let json = result.and_then(|r| {
        serde_json::to_string(&r).map_err(|e| ComputeError::EncodingError(e.to_string()))
    });
    match json {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Stateless API
// ============================================================================

/// Compute a day from its samples JSON and return the result JSON.
///
/// # Safety
/// - `samples_json` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `mobility_free_string`.
/// - Returns NULL on error; call `mobility_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn mobility_compute_day(
    samples_json: *const c_char,
    compute_chart: bool,
) -> *mut c_char {
    clear_last_error();

    let json_str = match cstr_to_string(samples_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid samples string pointer");
            return ptr::null_mut();
        }
    };

    match compute_day_json(&json_str, compute_chart) {
        Ok(result) => string_to_cstr(&result),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Engine Handle API
// ============================================================================

/// Opaque handle to a configured engine with its own sample store
pub struct MobilityEngineHandle {
    engine: MobilityEngine,
    store: MemoryStore,
    buffers: SampleBuffers,
}

/// Create an engine.
///
/// # Safety
/// - `config_json` must be a valid null-terminated C string, or NULL for defaults.
/// - Returns a pointer to a newly allocated engine that must be freed with
///   `mobility_engine_free`.
/// - Returns NULL on error; call `mobility_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn mobility_engine_new(config_json: *const c_char) -> *mut MobilityEngineHandle {
    clear_last_error();

    let config = if config_json.is_null() {
        EngineConfig::default()
    } else {
        let parsed = cstr_to_string(config_json)
            .ok_or_else(|| ComputeError::InvalidConfig("Invalid config string pointer".to_string()))
            .and_then(|json| EngineConfig::from_json(&json));
        match parsed {
            Ok(config) => config,
            Err(e) => {
                set_last_error(&e.to_string());
                return ptr::null_mut();
            }
        }
    };

    let engine = match MobilityEngine::with_config(config) {
        Ok(engine) => engine,
        Err(e) => {
            set_last_error(&e.to_string());
            return ptr::null_mut();
        }
    };

    let handle = Box::new(MobilityEngineHandle {
        engine,
        store: MemoryStore::new(),
        buffers: SampleBuffers::new(BufferConfig::default()),
    });
    Box::into_raw(handle)
}

/// Free an engine.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `mobility_engine_new`.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn mobility_engine_free(engine: *mut MobilityEngineHandle) {
    if !engine.is_null() {
        drop(Box::from_raw(engine));
    }
}

/// Switch the engine's buffers between foreground (flush every sample) and
/// background (flush when full) mode.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `mobility_engine_new`.
/// - Returns 0 on success, -1 on a null engine.
#[no_mangle]
pub unsafe extern "C" fn mobility_engine_set_foreground(
    engine: *mut MobilityEngineHandle,
    foreground: bool,
) -> i32 {
    clear_last_error();

    if engine.is_null() {
        set_last_error("Null engine pointer");
        return -1;
    }

    let handle = &mut *engine;
    handle.buffers.set_keep_flushing(foreground);
    0
}

/// Add samples to the engine's buffers, flushing into its store as they fill.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `mobility_engine_new`.
/// - `samples_json` must be a valid null-terminated C string.
/// - Returns the number of samples taken, or -1 on error.
/// - On error, call `mobility_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn mobility_engine_ingest(
    engine: *mut MobilityEngineHandle,
    samples_json: *const c_char,
) -> i64 {
    clear_last_error();

    if engine.is_null() {
        set_last_error("Null engine pointer");
        return -1;
    }

    let handle = &mut *engine;

    let json_str = match cstr_to_string(samples_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid samples string pointer");
            return -1;
        }
    };

    let ingested = DaySamples::from_json(&json_str).and_then(|samples| {
        SampleCollector::ingest(&mut handle.store, &mut handle.buffers, samples)
    });

    match ingested {
        Ok(taken) => taken as i64,
        Err(e) => {
            set_last_error(&e.to_string());
            -1
        }
    }
}

/// Compute the window `[start_ms, end_ms)` from the engine's stored and
/// buffered samples.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `mobility_engine_new`.
/// - Returns a newly allocated string that must be freed with `mobility_free_string`.
/// - Returns NULL on error; call `mobility_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn mobility_engine_compute_day(
    engine: *mut MobilityEngineHandle,
    start_ms: i64,
    end_ms: i64,
    compute_chart: bool,
) -> *mut c_char {
    clear_last_error();

    if engine.is_null() {
        set_last_error("Null engine pointer");
        return ptr::null_mut();
    }

    let handle = &mut *engine;
    let result = handle.engine.compute_day(
        &mut handle.store,
        &mut handle.buffers,
        start_ms,
        end_ms,
        compute_chart,
    );
    result_to_cstr(result)
}

/// Compute a day from its samples JSON with the engine's configuration.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `mobility_engine_new`.
/// - `samples_json` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `mobility_free_string`.
/// - Returns NULL on error; call `mobility_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn mobility_engine_compute_samples(
    engine: *const MobilityEngineHandle,
    samples_json: *const c_char,
    compute_chart: bool,
) -> *mut c_char {
    clear_last_error();

    if engine.is_null() {
        set_last_error("Null engine pointer");
        return ptr::null_mut();
    }

    let handle = &*engine;

    let json_str = match cstr_to_string(samples_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid samples string pointer");
            return ptr::null_mut();
        }
    };

    let result = DaySamples::from_json(&json_str)
        .and_then(|samples| handle.engine.compute_samples(samples, compute_chart));
    result_to_cstr(result)
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by engine functions.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by an engine function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn mobility_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Get the last error message.
///
/// # Safety
/// - Returns a pointer to a thread-local error string.
/// - The returned pointer is valid until the next engine function call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn mobility_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

// ============================================================================
// Version Information
// ============================================================================

/// Get the engine library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn mobility_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;

    fn sample_day_json() -> CString {
        CString::new(
            r#"{
            "start_time": 0,
            "end_time": 3600000,
            "locations": [
                {"timestamp": 60000, "latitude": 45.0, "longitude": 7.0}
            ],
            "activities": [
                {"timestamp": 1200000, "activity": "walking", "direction": "enter"}
            ],
            "steps": [
                {"timestamp": 1200000, "steps": 100},
                {"timestamp": 1800000, "steps": 1000}
            ]
        }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_ffi_compute_day() {
        let json = sample_day_json();

        unsafe {
            let result = mobility_compute_day(json.as_ptr(), true);
            assert!(!result.is_null());

            let result_str = CStr::from_ptr(result).to_str().unwrap();
            let value: serde_json::Value = serde_json::from_str(result_str).unwrap();
            assert_eq!(value["trips"][1]["activity"], "walking");

            mobility_free_string(result);
        }
    }

    #[test]
    fn test_ffi_engine_lifecycle() {
        unsafe {
            let engine = mobility_engine_new(ptr::null());
            assert!(!engine.is_null());

            let json = sample_day_json();
            assert_eq!(mobility_engine_ingest(engine, json.as_ptr()), 4);

            let result = mobility_engine_compute_day(engine, 0, 3_600_000, true);
            assert!(!result.is_null());
            let value: serde_json::Value =
                serde_json::from_str(CStr::from_ptr(result).to_str().unwrap()).unwrap();
            assert_eq!(value["steps"].as_array().map(|s| s.len()), Some(2));
            mobility_free_string(result);

            let result = mobility_engine_compute_samples(engine, json.as_ptr(), false);
            assert!(!result.is_null());
            mobility_free_string(result);

            assert_eq!(mobility_engine_set_foreground(engine, true), 0);
            mobility_engine_free(engine);
        }
    }

    #[test]
    fn test_ffi_engine_with_config() {
        let config = CString::new(r#"{"use_stay_points": false}"#).unwrap();
        let invalid = CString::new(r#"{"short_activity_ms": -1}"#).unwrap();

        unsafe {
            let engine = mobility_engine_new(config.as_ptr());
            assert!(!engine.is_null());
            mobility_engine_free(engine);

            let engine = mobility_engine_new(invalid.as_ptr());
            assert!(engine.is_null());
            assert!(!mobility_last_error().is_null());
        }
    }

    #[test]
    fn test_ffi_error_handling() {
        unsafe {
            let invalid_json = CString::new("not json").unwrap();
            let result = mobility_compute_day(invalid_json.as_ptr(), true);
            assert!(result.is_null());

            let error = mobility_last_error();
            assert!(!error.is_null());
            let error_str = CStr::from_ptr(error).to_str().unwrap();
            assert!(!error_str.is_empty());

            let window = mobility_engine_compute_day(ptr::null_mut(), 0, 1, true);
            assert!(window.is_null());
        }
    }

    #[test]
    fn test_ffi_inverted_window() {
        unsafe {
            let engine = mobility_engine_new(ptr::null());
            let result = mobility_engine_compute_day(engine, 1000, 0, true);
            assert!(result.is_null());

            let error_str = CStr::from_ptr(mobility_last_error()).to_str().unwrap();
            assert!(error_str.contains("window"));
            mobility_engine_free(engine);
        }
    }

    #[test]
    fn test_ffi_version() {
        unsafe {
            let version = mobility_version();
            assert!(!version.is_null());

            let version_str = CStr::from_ptr(version).to_str().unwrap();
            assert!(!version_str.is_empty());
        }
    }
}
