//! CUDA driver API bindings and [`ComputeDriver`] implementation
//!
//! Links against `libcuda` and is therefore gated behind the `cuda` feature;
//! the default build carries no GPU link dependency. Only the allocation and
//! context lifecycle entry points the runtime consumes are bound.

use std::ffi::{c_void, CStr};

use crate::backend::driver::{
    ComputeDriver, ComputeError, ComputeResult, DeviceHandle, DevicePtr, RawContext,
};

mod ffi {
    use std::ffi::c_void;

    // FFI declarations bound to the CUDA driver API. They appear unused to
    // the compiler because all calls go through unsafe blocks in the wrapper.
    #[link(name = "cuda")]
    #[allow(dead_code)]
    extern "C" {
        pub fn cuInit(flags: u32) -> i32;
        pub fn cuDeviceGet(device: *mut i32, ordinal: i32) -> i32;
        pub fn cuCtxCreate_v2(ctx: *mut *mut c_void, flags: u32, device: i32) -> i32;
        pub fn cuCtxSetCurrent(ctx: *mut c_void) -> i32;
        pub fn cuCtxDestroy_v2(ctx: *mut c_void) -> i32;
        pub fn cuMemAlloc_v2(ptr: *mut u64, size: usize) -> i32;
        pub fn cuMemAllocManaged(ptr: *mut u64, size: usize, flags: u32) -> i32;
        pub fn cuMemFree_v2(ptr: u64) -> i32;
        pub fn cuGetErrorString(code: i32, out: *mut *const i8) -> i32;
    }

    /// CUDA success status
    pub const CUDA_SUCCESS: i32 = 0;

    /// Managed memory attached globally (visible to every stream)
    pub const CU_MEM_ATTACH_GLOBAL: u32 = 0x1;
}

/// Human-readable message for a CUDA driver status code.
pub fn get_error_string(code: i32) -> String {
    let mut msg: *const i8 = std::ptr::null();
    let lookup = unsafe { ffi::cuGetErrorString(code, &mut msg) };
    if lookup != ffi::CUDA_SUCCESS || msg.is_null() {
        return format!("unknown CUDA error {}", code);
    }
    unsafe { CStr::from_ptr(msg).to_string_lossy().into_owned() }
}

fn check(call: &str, status: i32) -> ComputeResult<()> {
    if status == ffi::CUDA_SUCCESS {
        Ok(())
    } else {
        tracing::error!("{} failed: {} (status {})", call, get_error_string(status), status);
        Err(ComputeError::BackendFailure(status))
    }
}

/// CUDA driver backend.
#[derive(Debug, Default)]
pub struct CudaDriver;

impl CudaDriver {
    pub fn new() -> Self {
        CudaDriver
    }
}

impl ComputeDriver for CudaDriver {
    fn init(&self) -> ComputeResult<()> {
        check("cuInit", unsafe { ffi::cuInit(0) })
    }

    fn device_get(&self, ordinal: i32) -> ComputeResult<DeviceHandle> {
        let mut device: i32 = 0;
        check("cuDeviceGet", unsafe {
            ffi::cuDeviceGet(&mut device, ordinal)
        })?;
        Ok(device)
    }

    fn ctx_create(&self, device: DeviceHandle) -> ComputeResult<RawContext> {
        let mut ctx: *mut c_void = std::ptr::null_mut();
        check("cuCtxCreate", unsafe {
            ffi::cuCtxCreate_v2(&mut ctx, 0, device)
        })?;
        Ok(ctx as RawContext)
    }

    fn ctx_set_current(&self, ctx: RawContext) -> ComputeResult<()> {
        check("cuCtxSetCurrent", unsafe {
            ffi::cuCtxSetCurrent(ctx as *mut c_void)
        })
    }

    fn ctx_destroy(&self, ctx: RawContext) -> ComputeResult<()> {
        check("cuCtxDestroy", unsafe {
            ffi::cuCtxDestroy_v2(ctx as *mut c_void)
        })
    }

    fn mem_alloc(&self, size: usize) -> ComputeResult<DevicePtr> {
        let mut ptr: DevicePtr = 0;
        check("cuMemAlloc", unsafe { ffi::cuMemAlloc_v2(&mut ptr, size) })?;
        Ok(ptr)
    }

    fn mem_alloc_managed(&self, size: usize) -> ComputeResult<DevicePtr> {
        let mut ptr: DevicePtr = 0;
        check("cuMemAllocManaged", unsafe {
            ffi::cuMemAllocManaged(&mut ptr, size, ffi::CU_MEM_ATTACH_GLOBAL)
        })?;
        Ok(ptr)
    }

    fn mem_free(&self, ptr: DevicePtr) -> ComputeResult<()> {
        check("cuMemFree", unsafe { ffi::cuMemFree_v2(ptr) })
    }
}
