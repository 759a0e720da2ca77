//! End-to-end exec path: records shaped like the kernel probe's output go
//! through the channel, decoder, correlator and formatter.

use std::time::Instant;

use bytes::Bytes;
use kmon::domain::CpuId;
use kmon::monitoring::decode::record_bytes;
use kmon::monitoring::{consume, ExecProcessor, RawRecord, RecordProcessor};
use kmon_common::{
    terminate, walk_args, ArgStep, ExecEvent, ARG_LEN, EXEC_ARGUMENT, EXEC_COMPLETION, MAX_ARGS,
};
use tokio::sync::mpsc;

fn header(kind: u32, pid: u32, comm: &str) -> ExecEvent {
    let mut event = ExecEvent::zeroed(kind);
    event.pid = pid;
    event.ppid = 1;
    event.comm[..comm.len()].copy_from_slice(comm.as_bytes());
    event
}

/// Same copy semantics as `bpf_probe_read_user_str_bytes` into a fixed buffer
fn fragment(pid: u32, comm: &str, text: &[u8]) -> RawRecord {
    let mut event = header(EXEC_ARGUMENT, pid, comm);
    let len = text.len().min(ARG_LEN - 1);
    event.argv[..len].copy_from_slice(&text[..len]);
    terminate(&mut event.argv);
    raw(&event)
}

fn completion(pid: u32, comm: &str) -> RawRecord {
    raw(&header(EXEC_COMPLETION, pid, comm))
}

fn raw(event: &ExecEvent) -> RawRecord {
    RawRecord { cpu: CpuId(0), bytes: Bytes::from(record_bytes(event)) }
}

/// Records the entry probe would submit for `path` + `argv`, then the return probe's
fn execve(pid: u32, comm: &str, path: &str, argv: &[&str]) -> Vec<RawRecord> {
    let mut records = vec![fragment(pid, comm, path.as_bytes())];
    walk_args(|slot| match argv.get(slot) {
        Some(arg) => {
            records.push(fragment(pid, comm, arg.as_bytes()));
            ArgStep::Next
        }
        None => ArgStep::Stop,
    });
    records.push(completion(pid, comm));
    records
}

fn run(records: &[RawRecord]) -> Vec<String> {
    let mut processor = ExecProcessor::new(Vec::new(), 64, Instant::now());
    for record in records {
        processor.process(record).unwrap();
    }
    String::from_utf8(processor.into_inner()).unwrap().lines().map(str::to_string).collect()
}

fn args_column(row: &str) -> &str {
    // TIME(s) 8, PCOMM 16, PID 7, PPID 7, each followed by one space
    &row[8 + 1 + 16 + 1 + 7 + 1 + 7 + 1..]
}

#[test]
fn test_ls_command_line() {
    let rows = run(&execve(4242, "bash", "/bin/ls", &["ls", "-la"]));
    assert_eq!(rows.len(), 1);
    assert_eq!(args_column(&rows[0]), "/bin/ls ls -la");
    assert!(rows[0].contains(" 4242 "));
}

#[test]
fn test_long_argument_truncated() {
    let long = "x".repeat(200);
    let rows = run(&execve(10, "sh", "/bin/echo", &["echo", &long]));
    let expected = format!("/bin/echo echo {}", "x".repeat(ARG_LEN - 1));
    assert_eq!(args_column(&rows[0]), expected);
}

#[test]
fn test_argument_count_capped() {
    let argv: Vec<String> = (0..MAX_ARGS + 5).map(|i| format!("a{i}")).collect();
    let argv: Vec<&str> = argv.iter().map(String::as_str).collect();
    let rows = run(&execve(11, "sh", "/bin/true", &argv));

    let args = args_column(&rows[0]);
    let words: Vec<&str> = args.split(' ').collect();
    assert_eq!(words.len(), 1 + MAX_ARGS);
    assert_eq!(words.last().copied(), Some(format!("a{}", MAX_ARGS - 1).as_str()));
    assert!(!args.contains(&format!("a{MAX_ARGS}")));
}

#[test]
fn test_completion_without_fragments() {
    let rows = run(&[completion(12, "ghost")]);
    assert_eq!(rows.len(), 1);
    assert_eq!(args_column(&rows[0]), "");
}

#[test]
fn test_dropped_fragments_still_complete() {
    let mut records = execve(13, "bash", "/usr/bin/git", &["git", "commit", "-m", "msg"]);
    records.remove(2);
    records.remove(0);
    let rows = run(&records);
    assert_eq!(args_column(&rows[0]), "git -m msg");
}

#[test]
fn test_concurrent_execs_do_not_mix() {
    let a = execve(20, "make", "/usr/bin/cc", &["cc", "-c", "a.c"]);
    let b = execve(21, "make", "/usr/bin/cc", &["cc", "-c", "b.c"]);
    let mut records = Vec::new();
    for pair in a.iter().zip(b.iter()) {
        records.push(pair.0.clone());
        records.push(pair.1.clone());
    }
    let rows = run(&records);
    assert_eq!(rows.len(), 2);
    assert_eq!(args_column(&rows[0]), "/usr/bin/cc cc -c a.c");
    assert_eq!(args_column(&rows[1]), "/usr/bin/cc cc -c b.c");
}

#[tokio::test]
async fn test_consume_drains_channel_in_order() {
    let (tx, mut rx) = mpsc::channel(64);
    for record in execve(30, "bash", "/bin/cat", &["cat", "/etc/hostname"]) {
        tx.send(record).await.unwrap();
    }
    drop(tx);

    let mut processor = ExecProcessor::new(Vec::new(), 64, Instant::now());
    processor.write_header().unwrap();
    consume(&mut rx, &mut processor, std::future::pending()).await.unwrap();

    let summary = processor.summary();
    assert_eq!(summary.rows, 1);
    assert_eq!(summary.malformed, 0);
    let out = String::from_utf8(processor.into_inner()).unwrap();
    let lines: Vec<&str> = out.lines().collect();
    assert!(lines[0].starts_with("TIME(s)"));
    assert_eq!(args_column(lines[1]), "/bin/cat cat /etc/hostname");
}
