//! FFI bindings for vitaltrace
//!
//! This module provides C-compatible functions for calling vitaltrace from
//! other languages. All functions use C strings (null-terminated) and return
//! allocated memory that must be freed by the caller using `vitals_free_string`.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;
use std::sync::Arc;

use chrono::Utc;

use crate::devices::DeviceKind;
use crate::error::VitalsError;
use crate::history::InMemoryMetricStore;
use crate::pipeline::{frame_to_metrics, predict_trajectory, text_to_metrics, VitalsProcessor};
use crate::types::CanonicalMetric;

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

/// Borrow a byte buffer passed from C
unsafe fn bytes<'a>(data: *const u8, len: usize) -> Option<&'a [u8]> {
    if data.is_null() {
        return if len == 0 { Some(&[] as &[u8]) } else { None };
    }
    Some(std::slice::from_raw_parts(data, len))
}

/// Hand a result back across the boundary: JSON on success, NULL plus last error otherwise
fn json_result<T: serde::Serialize>(result: Result<T, VitalsError>) -> *mut c_char {
    match result.and_then(|value| Ok(serde_json::to_string(&value)?)) {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

macro_rules! required_str {
    ($ptr:expr, $what:literal, $fail:expr) => {
        match cstr_to_string($ptr) {
            Some(s) => s,
            None => {
                set_last_error(concat!("Invalid ", $what, " string pointer"));
                return $fail;
            }
        }
    };
}

// ============================================================================
// Stateless API
// ============================================================================

/// Decode one device frame and return its canonical metrics as a JSON array.
///
/// `kind` is a device kind name such as "heart_rate" or "blood-pressure".
///
/// # Safety
/// - `kind` must be a valid null-terminated C string.
/// - `data` must point to `len` readable bytes (it may be NULL when `len` is 0).
/// - Returns a newly allocated string that must be freed with `vitals_free_string`.
/// - Returns NULL on error; call `vitals_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn vitals_decode_frame(
    kind: *const c_char,
    data: *const u8,
    len: usize,
) -> *mut c_char {
    clear_last_error();

    let kind_str = required_str!(kind, "kind", ptr::null_mut());
    let Some(frame) = bytes(data, len) else {
        set_last_error("Null frame pointer");
        return ptr::null_mut();
    };

    json_result(
        kind_str
            .parse::<DeviceKind>()
            .and_then(|kind| frame_to_metrics(kind, frame, Utc::now())),
    )
}

/// Extract canonical metrics from free text as a JSON array.
///
/// # Safety
/// - `text` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `vitals_free_string`.
/// - Returns NULL on error; call `vitals_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn vitals_extract_text(text: *const c_char) -> *mut c_char {
    clear_last_error();

    let text_str = required_str!(text, "text", ptr::null_mut());
    json_result(text_to_metrics(&text_str, Utc::now()))
}

/// Predict a trajectory from a JSON array of canonical metrics.
///
/// # Safety
/// - `history_json` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `vitals_free_string`.
/// - Returns NULL on error; call `vitals_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn vitals_predict(history_json: *const c_char) -> *mut c_char {
    clear_last_error();

    let json_str = required_str!(history_json, "JSON", ptr::null_mut());
    json_result(
        serde_json::from_str::<Vec<CanonicalMetric>>(&json_str)
            .map_err(VitalsError::from)
            .map(|history| predict_trajectory(&history, Utc::now(), None)),
    )
}

// ============================================================================
// Stateful Processor API
// ============================================================================

/// Opaque handle to a VitalsProcessor and its in-memory history
pub struct VitalsProcessorHandle {
    processor: VitalsProcessor,
    store: Arc<InMemoryMetricStore>,
}

/// Create a processor for one subject, backed by an in-memory history.
///
/// # Safety
/// - `subject_id` must be a valid null-terminated C string.
/// - Returns a pointer to a newly allocated processor.
/// - Must be freed with `vitals_processor_free`.
/// - Returns NULL on error.
#[no_mangle]
pub unsafe extern "C" fn vitals_processor_new(
    subject_id: *const c_char,
) -> *mut VitalsProcessorHandle {
    clear_last_error();

    let subject = required_str!(subject_id, "subject_id", ptr::null_mut());
    let store = Arc::new(InMemoryMetricStore::new());
    match VitalsProcessor::new(subject, store.clone()) {
        Ok(processor) => Box::into_raw(Box::new(VitalsProcessorHandle { processor, store })),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Free a processor.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `vitals_processor_new`.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn vitals_processor_free(processor: *mut VitalsProcessorHandle) {
    if !processor.is_null() {
        drop(Box::from_raw(processor));
    }
}

/// Decode, normalize and store one device frame; returns the stored metrics.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `vitals_processor_new`.
/// - `kind` must be a valid null-terminated C string.
/// - `data` must point to `len` readable bytes (it may be NULL when `len` is 0).
/// - Returns a newly allocated string that must be freed with `vitals_free_string`.
/// - Returns NULL on error; call `vitals_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn vitals_processor_ingest_frame(
    processor: *mut VitalsProcessorHandle,
    kind: *const c_char,
    data: *const u8,
    len: usize,
) -> *mut c_char {
    clear_last_error();

    if processor.is_null() {
        set_last_error("Null processor pointer");
        return ptr::null_mut();
    }
    let handle = &*processor;

    let kind_str = required_str!(kind, "kind", ptr::null_mut());
    let Some(frame) = bytes(data, len) else {
        set_last_error("Null frame pointer");
        return ptr::null_mut();
    };

    json_result(
        kind_str
            .parse::<DeviceKind>()
            .and_then(|kind| handle.processor.ingest_frame(kind, frame)),
    )
}

/// Predict from the processor's stored history and return the encoded payload.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `vitals_processor_new`.
/// - Returns a newly allocated string that must be freed with `vitals_free_string`.
/// - Returns NULL on error; call `vitals_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn vitals_processor_predict(
    processor: *mut VitalsProcessorHandle,
) -> *mut c_char {
    clear_last_error();

    if processor.is_null() {
        set_last_error("Null processor pointer");
        return ptr::null_mut();
    }
    let handle = &*processor;

    match handle
        .processor
        .predict_json(Utc::now(), &mut rand::thread_rng())
    {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Save the processor's metric history to JSON.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `vitals_processor_new`.
/// - Returns a newly allocated string that must be freed with `vitals_free_string`.
/// - Returns NULL on error; call `vitals_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn vitals_processor_save_history(
    processor: *mut VitalsProcessorHandle,
) -> *mut c_char {
    clear_last_error();

    if processor.is_null() {
        set_last_error("Null processor pointer");
        return ptr::null_mut();
    }
    let handle = &*processor;

    match handle.store.to_json() {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Replace the processor's metric history with a saved snapshot.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `vitals_processor_new`.
/// - `json` must be a valid null-terminated C string.
/// - Returns 0 on success, non-zero on error.
/// - On error, call `vitals_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn vitals_processor_load_history(
    processor: *mut VitalsProcessorHandle,
    json: *const c_char,
) -> i32 {
    clear_last_error();

    if processor.is_null() {
        set_last_error("Null processor pointer");
        return -1;
    }
    let handle = &*processor;

    let json_str = required_str!(json, "JSON", -1);
    match handle.store.restore(&json_str) {
        Ok(()) => 0,
        Err(e) => {
            set_last_error(&e.to_string());
            -1
        }
    }
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by vitaltrace functions.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by a vitaltrace function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn vitals_free_string(ptr: *mut c_char) {
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
/// - The returned pointer is valid until the next vitaltrace call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn vitals_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

// ============================================================================
// Version Information
// ============================================================================

/// Get the library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn vitals_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}

#[cfg(test)]
mod tests {
    use super::*;

    unsafe fn take_string(ptr: *mut c_char) -> String {
        assert!(!ptr.is_null());
        let s = CStr::from_ptr(ptr).to_str().unwrap().to_string();
        vitals_free_string(ptr);
        s
    }

    #[test]
    fn test_ffi_decode_frame() {
        let kind = CString::new("heart_rate").unwrap();
        let frame = [0x00u8, 72];
        unsafe {
            let json = take_string(vitals_decode_frame(kind.as_ptr(), frame.as_ptr(), frame.len()));
            let metrics: Vec<CanonicalMetric> = serde_json::from_str(&json).unwrap();
            assert_eq!(metrics.len(), 1);
            assert_eq!(metrics[0].value, 72.0);
        }
    }

    #[test]
    fn test_ffi_extract_and_predict() {
        let text = CString::new("pulse 68, SpO2 98%").unwrap();
        unsafe {
            let metrics = take_string(vitals_extract_text(text.as_ptr()));
            let history = CString::new(metrics).unwrap();
            let prediction = take_string(vitals_predict(history.as_ptr()));
            let value: serde_json::Value = serde_json::from_str(&prediction).unwrap();
            assert_eq!(value["data_source"], "live");
            assert_eq!(value["metrics_used"], 2);
        }
    }

    #[test]
    fn test_ffi_processor_lifecycle() {
        unsafe {
            let subject = CString::new("subject-1").unwrap();
            let processor = vitals_processor_new(subject.as_ptr());
            assert!(!processor.is_null());

            let kind = CString::new("pulse_oximeter").unwrap();
            let mut frame = vec![0x00u8];
            frame.extend_from_slice(&crate::devices::Sfloat::encode(97, 0).0.to_le_bytes());
            frame.extend_from_slice(&crate::devices::Sfloat::encode(64, 0).0.to_le_bytes());
            let stored = take_string(vitals_processor_ingest_frame(
                processor,
                kind.as_ptr(),
                frame.as_ptr(),
                frame.len(),
            ));
            assert!(stored.contains("oxygen_saturation"));

            let payload = take_string(vitals_processor_predict(processor));
            assert!(payload.contains("\"subject_id\": \"subject-1\""));

            let history = vitals_processor_save_history(processor);
            assert!(!history.is_null());

            let processor2 = vitals_processor_new(subject.as_ptr());
            assert_eq!(vitals_processor_load_history(processor2, history), 0);
            assert_eq!((*processor2).store.len("subject-1").unwrap(), 2);

            vitals_free_string(history);
            vitals_processor_free(processor);
            vitals_processor_free(processor2);
        }
    }

    #[test]
    fn test_ffi_error_handling() {
        unsafe {
            let kind = CString::new("toaster").unwrap();
            let frame = [0x00u8, 72];
            let result = vitals_decode_frame(kind.as_ptr(), frame.as_ptr(), frame.len());
            assert!(result.is_null());

            let error = vitals_last_error();
            assert!(!error.is_null());
            let error_str = CStr::from_ptr(error).to_str().unwrap();
            assert!(!error_str.is_empty());

            let invalid = CString::new("not json").unwrap();
            assert!(vitals_predict(invalid.as_ptr()).is_null());
            assert!(vitals_processor_predict(ptr::null_mut()).is_null());
        }
    }

    #[test]
    fn test_ffi_predict_rejects_invalid_rows() {
        let row = |value: f64, unit: &str| {
            serde_json::json!([{
                "metric_type": "heart_rate",
                "metric_value": value,
                "metric_unit": unit,
                "recorded_at": "2024-01-01T00:00:00Z",
                "source": "import",
            }])
            .to_string()
        };
        unsafe {
            for history in [row(5000.0, "bpm"), row(64.0, "kg")] {
                let history = CString::new(history).unwrap();
                assert!(vitals_predict(history.as_ptr()).is_null());

                let error = vitals_last_error();
                assert!(!error.is_null());
                let error_str = CStr::from_ptr(error).to_str().unwrap();
                assert!(error_str.starts_with("Invalid JSON"));
            }
        }
    }

    #[test]
    fn test_ffi_version() {
        unsafe {
            let version = vitals_version();
            assert!(!version.is_null());

            let version_str = CStr::from_ptr(version).to_str().unwrap();
            assert!(!version_str.is_empty());
        }
    }
}
