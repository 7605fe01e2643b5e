mod common;

use std::sync::Arc;

use common::{mem_disk, pump_write_done, ScriptedConsole};
use os::{Kernel, KernelOptions};

fn console_kernel() -> (Arc<Kernel>, Arc<ScriptedConsole>) {
    let (device, wrote) = ScriptedConsole::new();
    let kernel = Arc::new(Kernel::new(
        mem_disk(128),
        device.clone(),
        KernelOptions::default(),
    ));
    pump_write_done(kernel.clone(), wrote);
    (kernel, device)
}

#[test]
fn read_buffer_stops_at_newline_and_drops_it() {
    let (kernel, device) = console_kernel();

    device.feed(&kernel.console, b"hi\nrest\n");

    let mut buf = [0u8; 16];
    assert_eq!(kernel.console.read_buffer(&mut buf), 2);
    assert_eq!(&buf[..2], b"hi");

    assert_eq!(kernel.console.read_buffer(&mut buf), 4);
    assert_eq!(&buf[..4], b"rest");
}

#[test]
fn read_buffer_respects_the_buffer_size() {
    let (kernel, device) = console_kernel();

    device.feed(&kernel.console, b"abcdef\n");

    let mut buf = [0u8; 3];
    assert_eq!(kernel.console.read_buffer(&mut buf), 3);
    assert_eq!(&buf, b"abc");

    assert_eq!(kernel.console.read_buffer(&mut buf), 3);
    assert_eq!(&buf, b"def");

    // 只剩换行符：一读就断行，计零
    assert_eq!(kernel.console.read_buffer(&mut buf), 0);
}

#[test]
fn concurrent_writers_do_not_interleave() {
    let (kernel, device) = console_kernel();

    let writers: Vec<_> = [b'a', b'b', b'c']
        .into_iter()
        .map(|letter| {
            let kernel = kernel.clone();
            os::thread::spawn("writer", 0, move || {
                for _ in 0..10 {
                    kernel.console.write_buffer(&[letter; 8]);
                }
            })
        })
        .collect();
    for writer in writers {
        writer.join().unwrap();
    }

    let output = device.output();
    assert_eq!(output.len(), 3 * 10 * 8);
    // 每一段 8 个字符都是同一字母，一气呵成
    for chunk in output.chunks(8) {
        assert!(chunk.iter().all(|&ch| ch == chunk[0]));
    }
}

#[test]
fn echo_through_the_process_fids() {
    let (kernel, device) = console_kernel();
    let process = os::process::Process::new(kernel.clone(), 0);

    device.feed(&kernel.console, b"ping\n");

    let mut line = [0u8; 32];
    let n = process.read(&mut line, 0).unwrap();
    assert_eq!(&line[..n], b"ping");

    assert_eq!(process.write(&line[..n], 1).unwrap(), 4);
    assert_eq!(device.output(), b"ping");
}
