//! # Attendance Core
//!
//! Offline-first storage core for a student attendance tracker. Batches,
//! per-batch rosters and attendance history are kept as JSON collections in a
//! local key-value store (LMDB on device), and a versioned migration upgrades
//! data written by older releases of the app.
//!
//! ## Features
//!
//! - **Whole-collection accessors**: one key per collection, reads degrade to empty, writes report failures
//! - **Schema migration**: v1 student ids become immutable `uid`s, attendance history is relinked
//! - **Idempotent startup**: [`run_migrations`] is safe on every launch and resumable after a crash
//! - **FFI-friendly**: C ABI functions exchanging JSON, for Flutter and React Native hosts
//!
//! ## Quick Start
//!
//! ```no_run
//! use attendance_core::{create_store, run_migrations, get_batches, free_response};
//! use std::ffi::CString;
//!
//! let name = CString::new("attendance").unwrap();
//! let store = create_store(name.as_ptr());
//!
//! // Must complete before any roster or attendance read.
//! free_response(run_migrations(store));
//!
//! let batches = get_batches(store);
//! free_response(batches);
//! ```
//!
//! ## FFI Functions
//!
//! - [`create_store`] / [`create_store_with_config`] - Open the on-device store
//! - [`run_migrations`] - Upgrade stored data to the current schema
//! - [`get_batches`] / [`set_batches`] - Batch collection
//! - [`get_students`] / [`set_students`] - Per-batch roster
//! - [`get_attendance`] / [`set_attendance`] - Per-batch attendance history
//! - [`remove_batch_data`] - Drop a batch's roster and history
//! - [`delete_batch`] - Remove a batch and cascade to its data
//! - [`generate_id`] - New unique identifier for host-created records
//! - [`close_store`] - Flush and release the handle
//! - [`free_response`] - Release a string returned by any of the above
//!
//! Every function except [`create_store`], [`create_store_with_config`] and
//! [`free_response`] returns a JSON-encoded [`AppResponse`](app_response::AppResponse).

pub mod app_response;
pub mod app_state;
pub mod attendance_book;
pub mod attendance_model;
pub mod id_generator;
pub mod kv_store;
pub mod lmdb_store;
pub mod migration;
pub mod storage;
pub mod store_config;
pub mod store_error;
pub mod version_gate;

use std::ffi::{CStr, CString};
use std::os::raw::c_char;

use log::{info, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::app_response::AppResponse;
use crate::app_state::AppState;
use crate::attendance_model::{AttendanceRecord, Batch, Student};
use crate::id_generator::IdGenerator;
use crate::store_config::StoreConfig;

/// Opens (or creates) the store `{name}.lmdb` with default settings.
///
/// Returns a handle to pass to every other function, or null if the name is
/// null, not UTF-8, or the store cannot be opened.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn create_store(name: *const c_char) -> *mut AppState {
    if name.is_null() {
        warn!("Null name pointer passed to create_store");
        return std::ptr::null_mut();
    }

    let name_str = match unsafe { CStr::from_ptr(name).to_str() } {
        Ok(s) => s,
        Err(e) => {
            warn!("Invalid UTF-8 in name parameter: {e}");
            return std::ptr::null_mut();
        }
    };

    open_state(&StoreConfig::new(name_str))
}

/// Opens the store described by a JSON [`StoreConfig`], e.g.
/// `{"name":"/data/attendance","mapSize":10485760}`.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn create_store_with_config(config_ptr: *const c_char) -> *mut AppState {
    if config_ptr.is_null() {
        warn!("Null config pointer passed to create_store_with_config");
        return std::ptr::null_mut();
    }

    let config_str = match unsafe { CStr::from_ptr(config_ptr).to_str() } {
        Ok(s) => s,
        Err(e) => {
            warn!("Invalid UTF-8 in config parameter: {e}");
            return std::ptr::null_mut();
        }
    };

    match serde_json::from_str::<StoreConfig>(config_str) {
        Ok(config) => open_state(&config),
        Err(e) => {
            warn!("Invalid store config: {e}");
            std::ptr::null_mut()
        }
    }
}

fn open_state(config: &StoreConfig) -> *mut AppState {
    info!("Attempting to open store at: {}", config.lmdb_dir());

    match AppState::init(config) {
        Ok(state) => {
            info!("Store initialized successfully");
            Box::into_raw(Box::new(state))
        }
        Err(e) => {
            warn!("Failed to initialize store: {e}");
            warn!("Attempted path: {}", config.lmdb_dir());
            std::ptr::null_mut()
        }
    }
}

/// Upgrades stored data to the current schema version.
///
/// Call once at startup and wait for it before reading students or
/// attendance. On success the `Ok` payload is the JSON
/// [`MigrationReport`](migration::MigrationReport); batches that could not be
/// migrated are listed there with a reason. A `DatabaseError` means the new
/// version could not be saved and the migration will run again next launch.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn run_migrations(state: *mut AppState) -> *const c_char {
    let state = match state_ref(state, "run_migrations") {
        Ok(s) => s,
        Err(err) => return err,
    };

    match state.run_migrations() {
        Ok(report) => ok_json(&report),
        Err(e) => response_to_c_string(&AppResponse::from(e)),
    }
}

/// Returns the batch collection as a JSON array.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn get_batches(state: *mut AppState) -> *const c_char {
    let state = match state_ref(state, "get_batches") {
        Ok(s) => s,
        Err(err) => return err,
    };

    let batches = state.block_on(state.book().storage().get_batches());
    ok_json(&batches)
}

/// Replaces the batch collection with the given JSON array.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn set_batches(state: *mut AppState, json_ptr: *const c_char) -> *const c_char {
    let state = match state_ref(state, "set_batches") {
        Ok(s) => s,
        Err(err) => return err,
    };

    let batches: Vec<Batch> = match parse_json_arg(json_ptr) {
        Ok(b) => b,
        Err(err) => return err,
    };

    match state.block_on(state.book().storage().set_batches(&batches)) {
        Ok(()) => response_to_c_string(&AppResponse::success("Batches saved successfully")),
        Err(e) => response_to_c_string(&AppResponse::from(e)),
    }
}

/// Returns the roster of a batch as a JSON array.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn get_students(state: *mut AppState, batch_id: *const c_char) -> *const c_char {
    let state = match state_ref(state, "get_students") {
        Ok(s) => s,
        Err(err) => return err,
    };

    let batch_id = match c_ptr_to_string(batch_id, "batch id") {
        Ok(id) => id,
        Err(err) => return err,
    };

    let students = state.block_on(state.book().storage().get_students(&batch_id));
    ok_json(&students)
}

/// Replaces the roster of a batch with the given JSON array.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn set_students(state: *mut AppState, batch_id: *const c_char, json_ptr: *const c_char) -> *const c_char {
    let state = match state_ref(state, "set_students") {
        Ok(s) => s,
        Err(err) => return err,
    };

    let batch_id = match c_ptr_to_string(batch_id, "batch id") {
        Ok(id) => id,
        Err(err) => return err,
    };

    let students: Vec<Student> = match parse_json_arg(json_ptr) {
        Ok(s) => s,
        Err(err) => return err,
    };

    match state.block_on(state.book().storage().set_students(&batch_id, &students)) {
        Ok(()) => response_to_c_string(&AppResponse::success("Students saved successfully")),
        Err(e) => response_to_c_string(&AppResponse::from(e)),
    }
}

/// Returns the attendance history of a batch as a JSON array.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn get_attendance(state: *mut AppState, batch_id: *const c_char) -> *const c_char {
    let state = match state_ref(state, "get_attendance") {
        Ok(s) => s,
        Err(err) => return err,
    };

    let batch_id = match c_ptr_to_string(batch_id, "batch id") {
        Ok(id) => id,
        Err(err) => return err,
    };

    let records = state.block_on(state.book().storage().get_attendance(&batch_id));
    ok_json(&records)
}

/// Replaces the attendance history of a batch with the given JSON array.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn set_attendance(state: *mut AppState, batch_id: *const c_char, json_ptr: *const c_char) -> *const c_char {
    let state = match state_ref(state, "set_attendance") {
        Ok(s) => s,
        Err(err) => return err,
    };

    let batch_id = match c_ptr_to_string(batch_id, "batch id") {
        Ok(id) => id,
        Err(err) => return err,
    };

    let records: Vec<AttendanceRecord> = match parse_json_arg(json_ptr) {
        Ok(r) => r,
        Err(err) => return err,
    };

    match state.block_on(state.book().storage().set_attendance(&batch_id, &records)) {
        Ok(()) => response_to_c_string(&AppResponse::success("Attendance saved successfully")),
        Err(e) => response_to_c_string(&AppResponse::from(e)),
    }
}

/// Drops the roster and attendance history of a batch. The batch entry itself
/// is left alone; see [`delete_batch`].
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn remove_batch_data(state: *mut AppState, batch_id: *const c_char) -> *const c_char {
    let state = match state_ref(state, "remove_batch_data") {
        Ok(s) => s,
        Err(err) => return err,
    };

    let batch_id = match c_ptr_to_string(batch_id, "batch id") {
        Ok(id) => id,
        Err(err) => return err,
    };

    match state.block_on(state.book().storage().remove_batch_data(&batch_id)) {
        Ok(()) => response_to_c_string(&AppResponse::success("Batch data removed successfully")),
        Err(e) => response_to_c_string(&AppResponse::from(e)),
    }
}

/// Removes a batch from the batch collection and drops its roster and history.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn delete_batch(state: *mut AppState, batch_id: *const c_char) -> *const c_char {
    let state = match state_ref(state, "delete_batch") {
        Ok(s) => s,
        Err(err) => return err,
    };

    let batch_id = match c_ptr_to_string(batch_id, "batch id") {
        Ok(id) => id,
        Err(err) => return err,
    };

    match state.block_on(state.book().delete_batch(&batch_id)) {
        Ok(true) => response_to_c_string(&AppResponse::success("Batch deleted successfully")),
        Ok(false) => response_to_c_string(&AppResponse::NotFound(format!("No batch found with id: {batch_id}"))),
        Err(e) => response_to_c_string(&AppResponse::from(e)),
    }
}

/// Returns a fresh unique identifier in the `Ok` payload.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn generate_id(state: *mut AppState) -> *const c_char {
    let state = match state_ref(state, "generate_id") {
        Ok(s) => s,
        Err(err) => return err,
    };

    response_to_c_string(&AppResponse::Ok(state.book().ids().new_id()))
}

/// Flushes the store and frees the handle. The pointer must not be used
/// afterwards.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn close_store(state: *mut AppState) -> *const c_char {
    if state.is_null() {
        let error = AppResponse::BadRequest("Null state pointer passed to close_store".to_string());
        return response_to_c_string(&error);
    }

    let state = unsafe { Box::from_raw(state) };

    match state.close() {
        Ok(()) => response_to_c_string(&AppResponse::success("Store closed successfully")),
        Err(e) => response_to_c_string(&AppResponse::from(e)),
    }
}

/// Frees a string returned by any function of this library. Null is ignored.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn free_response(ptr: *const c_char) {
    if ptr.is_null() {
        return;
    }
    unsafe {
        drop(CString::from_raw(ptr as *mut c_char));
    }
}

fn state_ref<'a>(state: *mut AppState, fn_name: &str) -> Result<&'a AppState, *const c_char> {
    match unsafe { state.as_ref() } {
        Some(s) => Ok(s),
        None => {
            let error = AppResponse::BadRequest(format!("Null state pointer passed to {fn_name}"));
            Err(response_to_c_string(&error))
        }
    }
}

fn parse_json_arg<T: DeserializeOwned>(json_ptr: *const c_char) -> Result<T, *const c_char> {
    let json_str = c_ptr_to_string(json_ptr, "JSON")?;

    serde_json::from_str(&json_str).map_err(|e| {
        let error = AppResponse::SerializationError(format!("Invalid JSON: {e}"));
        response_to_c_string(&error)
    })
}

fn ok_json<T: Serialize + ?Sized>(value: &T) -> *const c_char {
    match serde_json::to_string(value) {
        Ok(json) => response_to_c_string(&AppResponse::Ok(json)),
        Err(e) => response_to_c_string(&AppResponse::from(e)),
    }
}

/// Serializes `response` into a newly allocated C string, or null if that
/// fails. Release it with [`free_response`].
fn response_to_c_string(response: &AppResponse) -> *const c_char {
    let json = match serde_json::to_string(response) {
        Ok(j) => j,
        Err(e) => {
            warn!("Error serializing response: {e}");
            return std::ptr::null();
        }
    };

    match CString::new(json) {
        Ok(c_str) => c_str.into_raw(),
        Err(e) => {
            warn!("Error creating CString: {e}");
            std::ptr::null()
        }
    }
}

/// Converts a C string argument to an owned `String`, or a `BadRequest`
/// response naming `field_name` when it is null or not UTF-8.
fn c_ptr_to_string(ptr: *const c_char, field_name: &str) -> Result<String, *const c_char> {
    if ptr.is_null() {
        let error = AppResponse::BadRequest(format!("Null {field_name} pointer"));
        return Err(response_to_c_string(&error));
    }

    match unsafe { CStr::from_ptr(ptr).to_str() } {
        Ok(s) => Ok(s.to_string()),
        Err(e) => {
            let error = AppResponse::BadRequest(format!("Invalid UTF-8 in {field_name}: {e}"));
            Err(response_to_c_string(&error))
        }
    }
}
