use jtag_uart_link::common::clock::{CancelToken, RecordingSleeper};
use jtag_uart_link::host::{CapturePlan, DataReadyPolicy, HostDispatcher, MemoryRegion, RetryPolicy};
use jtag_uart_link::protocol::ParameterSet;
use jtag_uart_link::run_pipeline;
use jtag_uart_link::sim::{LoopbackTarget, MemoryImage};
use jtag_uart_link::TargetMachine;
use std::sync::Arc;

fn main() {
    let mut memory = MemoryImage::new();
    memory
        .load_words(0x43C0_0000, &[0x0000_0064, 0x0000_00C8, 0x0000_012C, 0x0000_0190])
        .load_words(0x43C0_0020, &[0x0000_0001, 0, 0x0000_0010, 0x0000_0002, 0, 0x0000_0020])
        .load_words(0x43C0_0038, &[0x0000_0003, 0, 0x0000_0030])
        .load(0x43C0_0060, b"zynq capture ok\0")
        .load_words(0x43C0_0070, &[0; 4])
        .load_words(0x43C0_0FFC, &[0])
        .schedule_word(0x43C0_0FFC, 1, 1);

    let target = LoopbackTarget::new(TargetMachine::new(Arc::new(RecordingSleeper::new())));
    let mut dispatcher = HostDispatcher::new(
        target,
        memory,
        RetryPolicy::default(),
        Arc::new(RecordingSleeper::new()),
    );
    let plan = CapturePlan {
        parameters: ParameterSet::default(),
        regions: vec![MemoryRegion::new("ddr_window", 0x43C0_0000, 0x80)],
        data_ready: DataReadyPolicy::Polling {
            addresses: vec![0x43C0_0FFC],
            max_polls: 5,
            interval_ms: 100,
            expected_value: 1,
        },
        wait_ready: None,
    };

    match run_pipeline(&mut dispatcher, &plan, None, &CancelToken::new()) {
        Ok(report) => match serde_json::to_string_pretty(&report.findings) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("Failed to serialize findings: {}", e),
        },
        Err(e) => eprintln!("Capture failed: {}", e),
    }
}
