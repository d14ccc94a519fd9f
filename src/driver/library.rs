//! Co-simulation components loaded from a shared library.
//!
//! All functions are resolved once in [`SharedLibrary::load`] into a typed
//! table; a missing symbol fails the load rather than a later call.

use std::borrow::Cow;
use std::ffi::{CStr, CString, c_char, c_int, c_void};
use std::path::{Path, PathBuf};
use std::ptr;

use libloading::Library;
use tracing::{debug, error, info, warn};

use super::abi::{CoSimulationAbi, DiscreteStatesUpdate, InstantiateArgs, StepOutcome};
use super::status::Status;
use crate::ValueReference;
use crate::error::DriverError;

type RawInstance = *mut c_void;
type LogMessageCallback =
    unsafe extern "C" fn(*mut c_void, c_int, *const c_char, *const c_char);

type GetVersionFn = unsafe extern "C" fn() -> *const c_char;
type InstantiateFn = unsafe extern "C" fn(
    *const c_char,
    *const c_char,
    *const c_char,
    bool,
    bool,
    bool,
    bool,
    *const ValueReference,
    usize,
    *mut c_void,
    Option<LogMessageCallback>,
    *const c_void,
) -> RawInstance;
type FreeInstanceFn = unsafe extern "C" fn(RawInstance);
type EnterInitializationModeFn =
    unsafe extern "C" fn(RawInstance, bool, f64, f64, bool, f64) -> c_int;
type InstanceFn = unsafe extern "C" fn(RawInstance) -> c_int;
type EnterEventModeFn =
    unsafe extern "C" fn(RawInstance, bool, bool, *const i32, usize, bool) -> c_int;
type UpdateDiscreteStatesFn = unsafe extern "C" fn(
    RawInstance,
    *mut bool,
    *mut bool,
    *mut bool,
    *mut bool,
    *mut bool,
    *mut f64,
) -> c_int;
type DoStepFn = unsafe extern "C" fn(
    RawInstance,
    f64,
    f64,
    bool,
    *mut bool,
    *mut bool,
    *mut bool,
    *mut f64,
) -> c_int;
type SetInt32Fn =
    unsafe extern "C" fn(RawInstance, *const ValueReference, usize, *const i32, usize) -> c_int;
type GetInt32Fn =
    unsafe extern "C" fn(RawInstance, *const ValueReference, usize, *mut i32, usize) -> c_int;
type SetClockFn =
    unsafe extern "C" fn(RawInstance, *const ValueReference, usize, *const bool, usize) -> c_int;
type GetClockFn =
    unsafe extern "C" fn(RawInstance, *const ValueReference, usize, *mut bool, usize) -> c_int;

struct FunctionTable {
    get_version: GetVersionFn,
    instantiate: InstantiateFn,
    free_instance: FreeInstanceFn,
    enter_initialization_mode: EnterInitializationModeFn,
    exit_initialization_mode: InstanceFn,
    enter_event_mode: EnterEventModeFn,
    terminate: InstanceFn,
    set_int32: SetInt32Fn,
    get_int32: GetInt32Fn,
    get_clock: GetClockFn,
    set_clock: SetClockFn,
    update_discrete_states: UpdateDiscreteStatesFn,
    enter_step_mode: InstanceFn,
    do_step: DoStepFn,
}

impl FunctionTable {
    fn bind(library: &Library) -> Result<Self, DriverError> {
        Ok(Self {
            get_version: symbol(library, "fmi3GetVersion")?,
            instantiate: symbol(library, "fmi3InstantiateCoSimulation")?,
            free_instance: symbol(library, "fmi3FreeInstance")?,
            enter_initialization_mode: symbol(library, "fmi3EnterInitializationMode")?,
            exit_initialization_mode: symbol(library, "fmi3ExitInitializationMode")?,
            enter_event_mode: symbol(library, "fmi3EnterEventMode")?,
            terminate: symbol(library, "fmi3Terminate")?,
            set_int32: symbol(library, "fmi3SetInt32")?,
            get_int32: symbol(library, "fmi3GetInt32")?,
            get_clock: symbol(library, "fmi3GetClock")?,
            set_clock: symbol(library, "fmi3SetClock")?,
            update_discrete_states: symbol(library, "fmi3UpdateDiscreteStates")?,
            enter_step_mode: symbol(library, "fmi3EnterStepMode")?,
            do_step: symbol(library, "fmi3DoStep")?,
        })
    }
}

fn symbol<T: Copy>(library: &Library, name: &'static str) -> Result<T, DriverError> {
    // SAFETY: each `T` above mirrors the C prototype of the named export.
    let found = unsafe { library.get::<T>(name.as_bytes()) }
        .map_err(|e| DriverError::Load(format!("{name}: {e}")))?;
    Ok(*found)
}

/// A live instance created by a [`SharedLibrary`].
#[derive(Debug)]
pub struct LibraryInstance {
    raw: RawInstance,
    /// Instance name handed to the component as its environment pointer;
    /// must outlive `raw`.
    environment: CString,
}

// SAFETY: the component is not assumed reentrant; the driver that owns the
// instance serializes every call, so moving it to another thread is sound.
unsafe impl Send for LibraryInstance {}

/// FMI 3.0 co-simulation binary loaded with `libloading`.
pub struct SharedLibrary {
    functions: FunctionTable,
    path: PathBuf,
    // Declared last so the table is never used after unload.
    _library: Library,
}

impl std::fmt::Debug for SharedLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedLibrary")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl SharedLibrary {
    /// Loads the library at `path` and binds every co-simulation function.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Load`] if the library cannot be opened or any
    /// function is missing.
    pub fn load(path: &Path) -> Result<Self, DriverError> {
        // SAFETY: opening runs the library's initialisers; callers only
        // point this at co-simulation binaries.
        let library = unsafe { Library::new(path) }
            .map_err(|e| DriverError::Load(format!("{}: {e}", path.display())))?;
        let functions = FunctionTable::bind(&library)?;
        info!(path = %path.display(), "component library loaded");
        Ok(Self {
            functions,
            path: path.to_path_buf(),
            _library: library,
        })
    }

    /// Path the library was loaded from.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Location of the binary inside an unpacked FMU for the host platform.
pub(crate) fn fmu_binary_path(fmu_root: &Path, model_identifier: &str) -> PathBuf {
    let (platform, extension) = if cfg!(target_os = "windows") {
        ("x86_64-windows", "dll")
    } else if cfg!(target_os = "macos") {
        ("x86_64-darwin", "dylib")
    } else {
        ("x86_64-linux", "so")
    };
    fmu_root
        .join("binaries")
        .join(platform)
        .join(format!("{model_identifier}.{extension}"))
}

unsafe fn lossy<'a>(text: *const c_char) -> Cow<'a, str> {
    if text.is_null() {
        Cow::Borrowed("")
    } else {
        // SAFETY: non-null strings from the component are NUL-terminated.
        unsafe { CStr::from_ptr(text) }.to_string_lossy()
    }
}

unsafe extern "C" fn forward_log(
    environment: *mut c_void,
    status: c_int,
    category: *const c_char,
    message: *const c_char,
) {
    // SAFETY: `environment` is the instance name set at instantiation, or null.
    let instance = unsafe { lossy(environment as *const c_char) };
    let category = unsafe { lossy(category) };
    let message = unsafe { lossy(message) };
    match Status::from_raw(status) {
        Status::Ok => debug!(%instance, %category, "{message}"),
        Status::Warning => warn!(%instance, %category, "{message}"),
        _ => error!(%instance, %category, "{message}"),
    }
}

impl CoSimulationAbi for SharedLibrary {
    type Instance = LibraryInstance;

    fn get_version(&self) -> String {
        // SAFETY: bound from the library held by `self`.
        let version = unsafe { (self.functions.get_version)() };
        unsafe { lossy(version) }.into_owned()
    }

    fn instantiate(&mut self, args: &InstantiateArgs<'_>) -> Option<LibraryInstance> {
        let name = CString::new(args.instance_name).ok()?;
        let token = CString::new(args.instantiation_token).ok()?;
        let resource = match args.resource_path {
            Some(path) => Some(CString::new(path).ok()?),
            None => None,
        };
        let environment = name.clone();

        // SAFETY: every pointer stays valid for the duration of the call;
        // `environment` is kept alive alongside the instance.
        let raw = unsafe {
            (self.functions.instantiate)(
                name.as_ptr(),
                token.as_ptr(),
                resource.as_ref().map_or(ptr::null(), |r| r.as_ptr()),
                args.visible,
                args.logging_on,
                args.event_mode_used,
                args.early_return_allowed,
                args.required_intermediate_variables.as_ptr(),
                args.required_intermediate_variables.len(),
                environment.as_ptr() as *mut c_void,
                Some(forward_log),
                ptr::null(),
            )
        };
        if raw.is_null() {
            return None;
        }
        Some(LibraryInstance { raw, environment })
    }

    fn free_instance(&mut self, instance: LibraryInstance) {
        // SAFETY: `instance.raw` came from this library and is freed once,
        // since `instance` is consumed here.
        unsafe { (self.functions.free_instance)(instance.raw) };
        debug!(instance = ?instance.environment, "library instance freed");
    }

    fn enter_initialization_mode(
        &mut self,
        instance: &mut LibraryInstance,
        tolerance: Option<f64>,
        start_time: f64,
        stop_time: Option<f64>,
    ) -> Status {
        let raw = unsafe {
            (self.functions.enter_initialization_mode)(
                instance.raw,
                tolerance.is_some(),
                tolerance.unwrap_or(0.0),
                start_time,
                stop_time.is_some(),
                stop_time.unwrap_or(0.0),
            )
        };
        Status::from_raw(raw)
    }

    fn exit_initialization_mode(&mut self, instance: &mut LibraryInstance) -> Status {
        Status::from_raw(unsafe { (self.functions.exit_initialization_mode)(instance.raw) })
    }

    fn enter_event_mode(
        &mut self,
        instance: &mut LibraryInstance,
        step_event: bool,
        state_event: bool,
        roots_found: &[i32],
        time_event: bool,
    ) -> Status {
        let raw = unsafe {
            (self.functions.enter_event_mode)(
                instance.raw,
                step_event,
                state_event,
                roots_found.as_ptr(),
                roots_found.len(),
                time_event,
            )
        };
        Status::from_raw(raw)
    }

    fn update_discrete_states(
        &mut self,
        instance: &mut LibraryInstance,
    ) -> (Status, DiscreteStatesUpdate) {
        let mut need_update = false;
        let mut terminate = false;
        let mut nominals_changed = false;
        let mut values_changed = false;
        let mut next_defined = false;
        let mut next_time = 0.0;
        let raw = unsafe {
            (self.functions.update_discrete_states)(
                instance.raw,
                &mut need_update,
                &mut terminate,
                &mut nominals_changed,
                &mut values_changed,
                &mut next_defined,
                &mut next_time,
            )
        };
        (
            Status::from_raw(raw),
            DiscreteStatesUpdate {
                discrete_states_need_update: need_update,
                terminate_simulation: terminate,
                nominals_of_continuous_states_changed: nominals_changed,
                values_of_continuous_states_changed: values_changed,
                next_event_time: next_defined.then_some(next_time),
            },
        )
    }

    fn enter_step_mode(&mut self, instance: &mut LibraryInstance) -> Status {
        Status::from_raw(unsafe { (self.functions.enter_step_mode)(instance.raw) })
    }

    fn do_step(
        &mut self,
        instance: &mut LibraryInstance,
        current_communication_point: f64,
        communication_step_size: f64,
        no_set_state_prior_to_current_point: bool,
    ) -> (Status, StepOutcome) {
        let mut outcome = StepOutcome::default();
        let raw = unsafe {
            (self.functions.do_step)(
                instance.raw,
                current_communication_point,
                communication_step_size,
                no_set_state_prior_to_current_point,
                &mut outcome.event_handling_needed,
                &mut outcome.terminate_simulation,
                &mut outcome.early_return,
                &mut outcome.last_successful_time,
            )
        };
        (Status::from_raw(raw), outcome)
    }

    fn terminate(&mut self, instance: &mut LibraryInstance) -> Status {
        Status::from_raw(unsafe { (self.functions.terminate)(instance.raw) })
    }

    fn set_int32(
        &mut self,
        instance: &mut LibraryInstance,
        references: &[ValueReference],
        values: &[i32],
    ) -> Status {
        let raw = unsafe {
            (self.functions.set_int32)(
                instance.raw,
                references.as_ptr(),
                references.len(),
                values.as_ptr(),
                values.len(),
            )
        };
        Status::from_raw(raw)
    }

    fn get_int32(
        &mut self,
        instance: &mut LibraryInstance,
        references: &[ValueReference],
        values: &mut [i32],
    ) -> Status {
        let raw = unsafe {
            (self.functions.get_int32)(
                instance.raw,
                references.as_ptr(),
                references.len(),
                values.as_mut_ptr(),
                values.len(),
            )
        };
        Status::from_raw(raw)
    }

    fn set_clock(
        &mut self,
        instance: &mut LibraryInstance,
        references: &[ValueReference],
        values: &[bool],
    ) -> Status {
        let raw = unsafe {
            (self.functions.set_clock)(
                instance.raw,
                references.as_ptr(),
                references.len(),
                values.as_ptr(),
                values.len(),
            )
        };
        Status::from_raw(raw)
    }

    fn get_clock(
        &mut self,
        instance: &mut LibraryInstance,
        references: &[ValueReference],
        values: &mut [bool],
    ) -> Status {
        let raw = unsafe {
            (self.functions.get_clock)(
                instance.raw,
                references.as_ptr(),
                references.len(),
                values.as_mut_ptr(),
                values.len(),
            )
        };
        Status::from_raw(raw)
    }
}
