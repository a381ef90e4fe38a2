use jtag_uart_link::analysis::VariableKind;
use jtag_uart_link::common::clock::{CancelToken, RecordingSleeper};
use jtag_uart_link::error::{DataNotReadyError, LinkError, PipelineError};
use jtag_uart_link::host::{
    run_pipeline, CapturePlan, DataReadyPolicy, HostDispatcher, MemoryRegion, RetryPolicy,
};
use jtag_uart_link::protocol::codec::{MAX_COMMAND_LEN, MAX_RESPONSE_LEN};
use jtag_uart_link::protocol::{Command, Height, ParamName, ParameterSet, ResponseStatus};
use jtag_uart_link::sim::{LoopbackTarget, MemoryImage};
use jtag_uart_link::target::{serve, TargetMachine, TargetStatus};
use jtag_uart_link::transport::StreamTransport;
use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

const WINDOW: u32 = 0x43C0_0000;
const FLAG: u32 = 0x43C0_0FFC;

fn policy() -> RetryPolicy {
    RetryPolicy {
        timeout: Duration::from_millis(20),
        max_retries: 2,
        backoff: Duration::from_millis(100),
    }
}

fn dispatcher(memory: MemoryImage) -> HostDispatcher<LoopbackTarget, MemoryImage> {
    let target = LoopbackTarget::new(TargetMachine::new(Arc::new(RecordingSleeper::new())));
    HostDispatcher::new(target, memory, policy(), Arc::new(RecordingSleeper::new()))
}

fn board_memory() -> MemoryImage {
    let mut memory = MemoryImage::new();
    let mut window = vec![0u8; 0x40];
    for (i, w) in [0x1111_0001u32, 0x1111_0002, 0x1111_0003, 0x1111_0004, 0x1111_0005]
        .iter()
        .enumerate()
    {
        window[i * 4..i * 4 + 4].copy_from_slice(&w.to_le_bytes());
    }
    window[0x20..0x2B].copy_from_slice(b"RESULT_DONE");
    memory.load(WINDOW, &window);
    memory.load_words(FLAG, &[0]).schedule_word(FLAG, 1, 2);
    memory
}

fn polling_plan(max_polls: u32) -> CapturePlan {
    CapturePlan {
        parameters: ParameterSet {
            param1: Height::Medium,
            param2: WINDOW,
            param3: 0x40,
        },
        regions: vec![MemoryRegion::new("ddr_window", WINDOW, 0x40)],
        data_ready: DataReadyPolicy::Polling {
            addresses: vec![FLAG],
            max_polls,
            interval_ms: 500,
            expected_value: 1,
        },
        wait_ready: Some(Duration::from_millis(20)),
    }
}

#[test]
fn set_param_is_visible_in_get_status() {
    let mut d = dispatcher(MemoryImage::new());
    let r = d
        .send(&Command::set_param(ParamName::Param2, 0x4000_0000))
        .unwrap();
    assert_eq!(r.status, ResponseStatus::ParamSetOk);

    let status = d.send(&Command::get_status()).unwrap();
    assert_eq!(status.status, ResponseStatus::Status);
    assert!(status.payload.contains("P2: 0x40000000"), "{}", status.payload);
}

#[test]
fn init_always_restores_defaults() {
    let mut d = dispatcher(MemoryImage::new());
    let settings: [&[(ParamName, u32)]; 3] = [
        &[],
        &[(ParamName::Param1, 3), (ParamName::Param3, 0x20)],
        &[
            (ParamName::Param1, 2),
            (ParamName::Param2, 0xFFFF_FFFC),
            (ParamName::Param3, 0),
        ],
    ];
    for set in settings {
        for &(name, value) in set {
            d.send(&Command::set_param(name, value)).unwrap();
        }
        d.send(&Command::run_app()).unwrap();
        assert_eq!(
            d.send(&Command::init()).unwrap().status,
            ResponseStatus::InitOk
        );
        let status = d.send(&Command::get_status()).unwrap();
        assert_eq!(
            status.payload,
            "INITIALIZED, P1: 0x00000001, P2: 0x43C00000, P3: 0x00001000"
        );
    }
}

#[test]
fn full_pipeline_with_polling() {
    let mut d = dispatcher(board_memory());
    let report = run_pipeline(&mut d, &polling_plan(10), None, &CancelToken::new()).unwrap();

    assert!(report.partial.is_none());
    assert_eq!(report.session.parameters.param1, Height::Medium);
    assert_eq!(report.session.bytes("ddr_window").unwrap().len(), 0x40);

    let arrays: Vec<_> = report
        .findings
        .variables
        .iter()
        .filter(|v| v.kind == VariableKind::ArrayRun)
        .collect();
    assert_eq!(arrays.len(), 1);
    assert_eq!(arrays[0].address, WINDOW);
    assert_eq!(arrays[0].length, 20);
    assert_eq!(report.findings.by_kind.string, 1);

    let (target, memory) = d.into_parts();
    assert_eq!(target.machine().state().status, TargetStatus::Completed);
    // Three polls plus one capture read.
    assert_eq!(memory.reads(), 4);
}

#[test]
fn exhausted_polling_stops_before_capture() {
    let mut memory = MemoryImage::new();
    memory.load_words(FLAG, &[0]);
    let mut d = dispatcher(memory);
    let err = run_pipeline(&mut d, &polling_plan(4), None, &CancelToken::new()).unwrap_err();
    assert!(matches!(
        err,
        PipelineError::DataNotReady(DataNotReadyError::Exhausted { attempts: 4 })
    ));
    // init, three set_param, run_app; capture_ram never sent.
    let (target, memory) = d.into_parts();
    assert_eq!(target.commands_seen(), 5);
    assert_eq!(memory.reads(), 4);
}

#[test]
fn failing_poll_read_counts_as_one_observation() {
    let mut memory = MemoryImage::new();
    memory.fail_at(FLAG);
    let target = LoopbackTarget::new(TargetMachine::new(Arc::new(RecordingSleeper::new())));
    let sleeper = Arc::new(RecordingSleeper::new());
    let mut d = HostDispatcher::new(target, memory, policy(), sleeper.clone());

    let err = run_pipeline(&mut d, &polling_plan(4), None, &CancelToken::new()).unwrap_err();
    assert!(matches!(
        err,
        PipelineError::DataNotReady(DataNotReadyError::Exhausted { attempts: 4 })
    ));
    let (_, memory) = d.into_parts();
    assert_eq!(memory.reads(), 4);
    // Three poll intervals and no retry backoff.
    assert_eq!(sleeper.total(), Duration::from_millis(1500));
}

#[test]
fn failed_region_is_reported_not_dropped() {
    let mut memory = board_memory();
    memory.fail_at(0x4000_0000);
    let mut plan = polling_plan(10);
    plan.regions.insert(0, MemoryRegion::new("missing", 0x4000_0000, 0x10));
    let mut d = dispatcher(memory);

    let report = run_pipeline(&mut d, &plan, None, &CancelToken::new()).unwrap();
    let partial = report.partial.expect("partial failure expected");
    assert_eq!(partial.failed, vec!["missing".to_string()]);
    assert_eq!(report.session.regions.len(), 2);
    assert_eq!(report.session.bytes("missing").unwrap().len(), 0);
    assert_eq!(report.session.bytes("ddr_window").unwrap().len(), 0x40);
    assert!(report
        .findings
        .variables
        .iter()
        .all(|v| v.region == "ddr_window"));
}

#[test]
fn lost_replies_are_retried() {
    let mut d = dispatcher(MemoryImage::new());
    d.transport_mut().drop_next_replies(2);
    let r = d.send(&Command::init()).unwrap();
    assert_eq!(r.status, ResponseStatus::InitOk);
    assert_eq!(d.transport_mut().commands_seen(), 3);
}

#[test]
fn silent_target_fails_after_three_attempts() {
    let mut d = dispatcher(MemoryImage::new());
    d.transport_mut().drop_next_replies(10);
    let err = d.send(&Command::get_status()).unwrap_err();
    assert_eq!(err.attempts, 3);
    assert!(matches!(err.last_error, LinkError::Timeout(_)));
    assert_eq!(d.transport_mut().commands_seen(), 3);
}

#[test]
fn manual_confirmation_drives_pipeline() {
    let mut plan = polling_plan(1);
    plan.data_ready = DataReadyPolicy::Manual;
    plan.wait_ready = None;
    let (tx, rx) = std::sync::mpsc::channel();
    tx.send(()).unwrap();
    let mut d = dispatcher(board_memory());
    let report = run_pipeline(&mut d, &plan, Some(&rx), &CancelToken::new()).unwrap();
    assert!(report.partial.is_none());
    assert!(report.findings.total > 0);
}

#[test]
fn serve_over_tcp() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let server = std::thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut transport = StreamTransport::new(stream, MAX_COMMAND_LEN - 1);
        let mut machine = TargetMachine::new(Arc::new(RecordingSleeper::new()));
        serve(&mut transport, &mut machine, &CancelToken::new()).unwrap();
        machine.state().clone()
    });

    let transport =
        jtag_uart_link::transport::TcpTransport::connect(&addr.to_string(), MAX_RESPONSE_LEN - 1)
            .unwrap();
    let mut d = HostDispatcher::new(
        transport,
        jtag_uart_link::host::NoBridge,
        RetryPolicy {
            timeout: Duration::from_secs(2),
            ..policy()
        },
        Arc::new(RecordingSleeper::new()),
    );
    d.wait_ready(Duration::from_secs(2)).unwrap();
    let r = d
        .send(&Command::set_param(ParamName::Param2, 0x4000_0000))
        .unwrap();
    assert_eq!(r.status, ResponseStatus::ParamSetOk);
    let r = d.send(&Command::init()).unwrap();
    assert_eq!(r.status, ResponseStatus::InitOk);
    let r = d.send(&Command::run_app()).unwrap();
    assert_eq!(r.status, ResponseStatus::RunOk);
    let r = d.send(&Command::exit()).unwrap();
    assert_eq!(r.status, ResponseStatus::ExitOk);

    let state = server.join().unwrap();
    assert_eq!(state.status, TargetStatus::Exiting);
}
