//! Diagnostic walk-through of the runtime bridge.
//!
//! Initializes the compute context, allocates one paired and one unified
//! tensor of a 4096-byte frame, prints what came back, and frees both.
//! Runs against the mock driver by default; build with `--features cuda`
//! to exercise the real CUDA driver.

use std::sync::Arc;

use cubridge::{BridgeError, ComputeDriver, Mode, Runtime, ScratchArena};

const FRAME_SIZE: usize = 4096;

fn driver() -> Arc<dyn ComputeDriver> {
    #[cfg(feature = "cuda")]
    {
        Arc::new(cubridge::CudaDriver::new())
    }
    #[cfg(not(feature = "cuda"))]
    {
        Arc::new(cubridge::MockDriver::new())
    }
}

fn main() -> anyhow::Result<()> {
    cubridge::init_logging()?;

    let runtime = Runtime::new(driver());

    println!("Initializing compute context...");
    if let Err(err) = runtime.ensure_context() {
        let err = BridgeError::from(err);
        eprintln!("context init failed ({:?}): {}", err.category(), err);
        std::process::exit(1);
    }
    println!("Context ready.");

    println!("frame_size = {:#x}", FRAME_SIZE);

    let block = runtime.malloc(FRAME_SIZE)?;
    println!("bump block          = {:p}", block.as_ptr());

    let paired = runtime.tensor_alloc(FRAME_SIZE, Mode::Paired)?;
    println!("paired host ptr     = {:p}", paired.host_ptr()?.as_ptr());
    println!("paired device ptr   = {:#018x}", paired.device_ptr()?);
    println!("paired size         = {}", paired.size());

    let unified = runtime.tensor_alloc(FRAME_SIZE, Mode::Unified)?;
    println!("unified ptr         = {:#018x}", unified.unified_ptr()?);

    let mut scratch = ScratchArena::new(64 * 1024)?;
    let staging = scratch.allocate(FRAME_SIZE, 256)?;
    println!("scratch staging     = offset {}", staging);
    scratch.deallocate(staging, FRAME_SIZE);

    println!("Memory allocation successful!");

    runtime.tensor_free(paired);
    runtime.tensor_free(unified);
    runtime.free(block);

    Ok(())
}
