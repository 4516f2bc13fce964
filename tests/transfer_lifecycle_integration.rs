//! Integration tests for transfer stages and computing elements
//!
//! These tests validate:
//! - The initialize / evaluate / shutdown contract
//! - Built-in functions driven through stages
//! - Hosts keeping their previous output on failure
//! - Independent elements on different threads

mod common;

use common::builders::{stage_context, SampleFixture};
use common::mocks::named_mock;
use common::{shared, ticking_clock};
use mockall::predicate::always;
use mockall::Sequence;
use monitor_core::{
    AlarmState, ComputingElement, CoreError, Inputs, LifecycleState, ModeOverride,
    OperationalMode, Priority, TransferRegistry, TransferStage, Value,
};
use std::thread;

#[test]
fn test_mock_lifecycle_order() {
    let clock = ticking_clock();
    let mut mock = named_mock();
    let mut seq = Sequence::new();

    mock.expect_initialize()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Ok(()));
    mock.expect_evaluate()
        .times(2)
        .in_sequence(&mut seq)
        .returning(|ctx, _, current| current.with_mode(OperationalMode::Degraded, ctx.clock()));
    mock.expect_shutdown()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Ok(()));

    let ctx = stage_context("m", &[], shared(&clock));
    let mut stage = TransferStage::new(Box::new(mock), ctx).unwrap();
    let current = SampleFixture::new("m", 1i64).build();

    stage.initialize().unwrap();
    let first = stage.evaluate(&Inputs::new(), &current).unwrap();
    let second = stage.evaluate(&Inputs::new(), &first).unwrap();
    stage.shutdown().unwrap();

    assert_eq!(second.mode(), OperationalMode::Degraded);
    assert!(second.timestamp() > first.timestamp());
    assert_eq!(stage.evaluations(), 2);
}

#[test]
fn test_evaluate_outside_initialized_never_reaches_function() {
    let clock = ticking_clock();
    let mut mock = named_mock();
    mock.expect_evaluate().never();
    mock.expect_initialize().times(1).returning(|_| Ok(()));
    mock.expect_shutdown().times(1).returning(|_| Ok(()));

    let ctx = stage_context("m", &[], shared(&clock));
    let mut stage = TransferStage::new(Box::new(mock), ctx).unwrap();
    let current = SampleFixture::new("m", 1i64).build();

    let before = stage.evaluate(&Inputs::new(), &current).unwrap_err();
    assert!(before.is_lifecycle_violation());
    assert_eq!(stage.state(), LifecycleState::Created);

    stage.initialize().unwrap();
    stage.shutdown().unwrap();

    let after = stage.evaluate(&Inputs::new(), &current).unwrap_err();
    assert!(after.is_lifecycle_violation());
    assert_eq!(stage.state(), LifecycleState::ShutDown);
}

#[test]
fn test_function_error_is_returned_unchanged() {
    let clock = ticking_clock();
    let mut mock = named_mock();
    mock.expect_initialize().returning(|_| Ok(()));
    mock.expect_evaluate()
        .with(always(), always(), always())
        .returning(|ctx, _, _| Err(ctx.evaluation_error("sensor offline")));

    let ctx = stage_context("m", &[], shared(&clock));
    let mut stage = TransferStage::new(Box::new(mock), ctx).unwrap();
    stage.initialize().unwrap();

    let err = stage
        .evaluate(&Inputs::new(), &SampleFixture::new("m", 0i64).build())
        .unwrap_err();
    match err {
        CoreError::Evaluation { stage, message } => {
            assert_eq!(stage, "obs:m");
            assert_eq!(message, "sensor offline");
        }
        other => panic!("unexpected error {other}"),
    }
    assert_eq!(stage.state(), LifecycleState::Initialized);
}

#[test]
fn test_failed_initialize_then_shutdown() {
    let clock = ticking_clock();
    let mut mock = named_mock();
    mock.expect_initialize()
        .returning(|_| Err(CoreError::Config("no database".into())));
    mock.expect_shutdown().times(1).returning(|_| Ok(()));

    let ctx = stage_context("m", &[], shared(&clock));
    let mut stage = TransferStage::new(Box::new(mock), ctx).unwrap();

    assert!(matches!(stage.initialize(), Err(CoreError::Config(_))));
    assert_eq!(stage.state(), LifecycleState::Failed);
    stage.shutdown().unwrap();
    assert_eq!(stage.state(), LifecycleState::ShutDown);
}

#[test]
fn test_alarm_set_with_empty_triggers_is_noop() {
    let clock = ticking_clock();
    let ctx = stage_context("hot", &[], shared(&clock));
    let mut stage = TransferStage::new(Box::new(ModeOverride::new()), ctx).unwrap();
    stage.initialize().unwrap();

    let current = SampleFixture::alarm("hot", AlarmState::set(Priority::High)).build();
    let output = stage.evaluate(&Inputs::new(), &current).unwrap();

    assert_eq!(output.mode(), OperationalMode::Shutdown);
    assert_eq!(output.alarm(), Some(AlarmState::set(Priority::High)));
    assert_eq!(output.running_id(), "obs:hot");
}

#[test]
fn test_missing_input_keeps_previous_output() {
    let clock = ticking_clock();
    let ctx = stage_context(
        "asce",
        &[
            ("script", "#{ value: inputs.temp.value + 1 }"),
            ("required_inputs", "temp"),
        ],
        shared(&clock),
    );
    let stage = TransferRegistry::with_builtins()
        .build_stage("script", ctx)
        .unwrap();
    let mut element =
        ComputingElement::new(stage, SampleFixture::new("asce", 0i64).build()).unwrap();
    element.start().unwrap();

    element
        .submit(SampleFixture::new("pressure", 3i64).build())
        .unwrap();
    let before = element.output().clone();
    let err = element.update().unwrap_err();

    assert!(err.is_evaluation());
    assert!(err.to_string().contains("temp"));
    assert_eq!(element.output(), &before);

    element
        .submit(SampleFixture::new("temp", 20i64).build())
        .unwrap();
    assert_eq!(element.update().unwrap().get::<i64>(), Some(&21));
    element.stop().unwrap();
}

#[test]
fn test_elements_run_on_separate_threads() {
    let clock = ticking_clock();
    let registry = TransferRegistry::with_builtins();

    let elements: Vec<ComputingElement> = (0..4)
        .map(|i| {
            let id = format!("e{}", i);
            let ctx = stage_context(
                &id,
                &[("script", "#{ value: output.value + 1 }")],
                shared(&clock),
            );
            let stage = registry.build_stage("script", ctx).unwrap();
            ComputingElement::new(stage, SampleFixture::new(&id, Value::Int64(0)).build()).unwrap()
        })
        .collect();

    let finished: Vec<ComputingElement> = thread::scope(|scope| {
        let handles: Vec<_> = elements
            .into_iter()
            .map(|mut element| {
                scope.spawn(move || {
                    element.start().unwrap();
                    for _ in 0..50 {
                        element.update().unwrap();
                    }
                    element.stop().unwrap();
                    element
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    for element in &finished {
        assert_eq!(element.output().get::<i64>(), Some(&50));
        assert_eq!(element.state(), LifecycleState::ShutDown);
        assert_eq!(element.stage().evaluations(), 50);
    }
}
