//! Tensor lifecycle and context management tests against the mock backend

use std::sync::Arc;

use cubridge::backend::DriverCall;
use cubridge::{
    ContextManager, DeviceFailurePolicy, MockDriver, Mode, Runtime, RuntimeConfig, TensorError,
    TensorManager,
};

fn runtime_with_mock() -> (Runtime, Arc<MockDriver>) {
    let driver = Arc::new(MockDriver::new());
    let runtime = Runtime::new(driver.clone());
    (runtime, driver)
}

#[test]
fn paired_alloc_rounds_device_request_to_256() {
    let (runtime, driver) = runtime_with_mock();

    let tensor = runtime.tensor_alloc(100, Mode::Paired).unwrap();
    assert_eq!(tensor.size(), 256);
    assert!(tensor.host_ptr().is_ok());
    assert!(tensor.device_ptr().is_ok());

    let calls = driver.calls();
    assert!(calls.contains(&DriverCall::MemAlloc(256)));

    runtime.tensor_free(tensor);
    assert_eq!(driver.live_allocations(), 0);
}

#[test]
fn unified_alloc_rounds_and_reports_zero_size() {
    let (runtime, driver) = runtime_with_mock();

    let tensor = runtime.tensor_alloc(1000, Mode::Unified).unwrap();
    assert_eq!(tensor.mode(), Mode::Unified);
    // Unified allocations are not size-tracked.
    assert_eq!(tensor.size(), 0);

    let calls = driver.calls();
    assert!(calls.contains(&DriverCall::MemAllocManaged(1024)));

    runtime.tensor_free(tensor);
    assert_eq!(driver.live_allocations(), 0);
}

#[test]
fn context_is_initialized_exactly_once() {
    let (runtime, driver) = runtime_with_mock();

    runtime.ensure_context().unwrap();
    runtime.ensure_context().unwrap();
    runtime.tensor_alloc(64, Mode::Paired).unwrap();

    let init_steps: Vec<DriverCall> = driver
        .calls()
        .into_iter()
        .filter(|c| {
            matches!(
                c,
                DriverCall::Init
                    | DriverCall::DeviceGet(_)
                    | DriverCall::CtxCreate(_)
                    | DriverCall::CtxSetCurrent(_)
            )
        })
        .collect();

    assert_eq!(
        init_steps,
        vec![
            DriverCall::Init,
            DriverCall::DeviceGet(0),
            DriverCall::CtxCreate(0),
            DriverCall::CtxSetCurrent(0xC0DE),
        ]
    );
}

#[test]
fn context_retries_after_a_failed_initialization() {
    let driver = Arc::new(MockDriver::new());
    driver.fail_next_init(999);
    let manager = ContextManager::new(driver.clone());

    assert!(manager.ensure_context().is_err());
    assert!(!manager.is_initialized());

    // The failure is not sticky: the next attempt runs the full sequence.
    manager.ensure_context().unwrap();
    assert!(manager.is_initialized());

    assert_eq!(
        driver.calls(),
        vec![
            DriverCall::Init,
            DriverCall::Init,
            DriverCall::DeviceGet(0),
            DriverCall::CtxCreate(0),
            DriverCall::CtxSetCurrent(0xC0DE),
        ]
    );
}

#[test]
fn freeing_one_tensor_leaves_others_live() {
    let (runtime, driver) = runtime_with_mock();

    let a = runtime.tensor_alloc(100, Mode::Paired).unwrap();
    let b = runtime.tensor_alloc(300, Mode::Paired).unwrap();
    let c = runtime.tensor_alloc(50, Mode::Unified).unwrap();
    assert_eq!(driver.live_allocations(), 3);

    let b_device = b.device_ptr().unwrap();
    runtime.tensor_free(a);

    assert_eq!(driver.live_allocations(), 2);
    assert_eq!(b.device_ptr().unwrap(), b_device);
    assert_eq!(b.size(), 512);
    assert!(c.unified_ptr().is_ok());

    runtime.tensor_free(b);
    runtime.tensor_free(c);
    assert_eq!(driver.live_allocations(), 0);
}

#[test]
fn handle_accessors_reject_the_wrong_mode() {
    let (runtime, _driver) = runtime_with_mock();

    let paired = runtime.tensor_alloc(64, Mode::Paired).unwrap();
    let unified = runtime.tensor_alloc(64, Mode::Unified).unwrap();

    assert!(matches!(
        paired.unified_ptr(),
        Err(TensorError::WrongMode { .. })
    ));
    assert!(matches!(
        unified.host_ptr(),
        Err(TensorError::WrongMode { .. })
    ));
    assert!(matches!(
        unified.device_ptr(),
        Err(TensorError::WrongMode { .. })
    ));

    runtime.tensor_free(paired);
    runtime.tensor_free(unified);
}

#[test]
fn device_failure_unwinds_the_host_side() {
    let driver = Arc::new(MockDriver::new());
    let context = Arc::new(ContextManager::new(driver.clone()));
    let manager = TensorManager::new(context, DeviceFailurePolicy::Propagate);

    driver.fail_next_mem_alloc(2);
    let err = manager.alloc(128, Mode::Paired).unwrap_err();
    assert!(matches!(err, TensorError::DeviceAllocFailed(2)));
    assert_eq!(driver.live_allocations(), 0);

    // The manager stays usable after the failure.
    let tensor = manager.alloc(128, Mode::Paired).unwrap();
    assert_eq!(driver.live_allocations(), 1);
    manager.free(tensor);
}

#[test]
fn unified_failure_propagates_the_driver_code() {
    let driver = Arc::new(MockDriver::new());
    let context = Arc::new(ContextManager::new(driver.clone()));
    let manager = TensorManager::new(context, DeviceFailurePolicy::Propagate);

    driver.fail_next_mem_alloc_managed(2);
    let err = manager.alloc(4096, Mode::Unified).unwrap_err();
    assert!(matches!(err, TensorError::DeviceAllocFailed(2)));
    assert_eq!(driver.live_allocations(), 0);
}

#[test]
fn zero_size_requests_are_rejected_before_the_driver() {
    let (runtime, driver) = runtime_with_mock();

    let err = runtime.tensor_alloc(0, Mode::Paired).unwrap_err();
    assert!(matches!(err, TensorError::ZeroSize));
    let err = runtime.tensor_alloc(0, Mode::Unified).unwrap_err();
    assert!(matches!(err, TensorError::ZeroSize));

    assert!(driver
        .calls()
        .iter()
        .all(|c| !matches!(c, DriverCall::MemAlloc(_) | DriverCall::MemAllocManaged(_))));
}

#[test]
fn oversized_requests_never_reach_the_driver() {
    let (runtime, driver) = runtime_with_mock();

    // Sizes whose 256-byte rounding would overflow are refused up front
    // rather than wrapped into a small (or zero) backend request.
    let err = runtime.tensor_alloc(usize::MAX, Mode::Paired).unwrap_err();
    assert!(matches!(err, TensorError::TooLarge(_)));
    let err = runtime.tensor_alloc(usize::MAX - 100, Mode::Unified).unwrap_err();
    assert!(matches!(err, TensorError::TooLarge(_)));

    assert!(driver.calls().is_empty());
    assert_eq!(driver.live_allocations(), 0);
}

#[test]
fn runtime_config_carries_the_failure_policy() {
    let driver = Arc::new(MockDriver::new());
    let config = RuntimeConfig {
        heap_capacity: 1 << 20,
        device_failure_policy: DeviceFailurePolicy::Propagate,
    };
    let runtime = Runtime::with_config(driver.clone(), config);

    driver.fail_next_mem_alloc(700);
    let err = runtime.tensor_alloc(64, Mode::Paired).unwrap_err();
    assert!(matches!(err, TensorError::DeviceAllocFailed(700)));
}
