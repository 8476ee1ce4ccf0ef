use std::collections::HashMap;
use std::net::TcpStream;
use std::time::Duration;

use husky_mailbox::{CentralRecver, MailboxEventLoop};
use husky_types::{ByteBatch, ChannelId, GlobalThreadId, ProcessId, Progress};

// S3: two processes, one thread each; thread 0 in P sends to thread 1 in Q
// over a real loopback TCP connection, both call send_complete, and each
// side observes exactly one batch/completion.
#[test]
fn two_process_send_and_completion() {
    let p = ProcessId::new(0);
    let q = ProcessId::new(1);
    let thread_p = GlobalThreadId::new(0);
    let thread_q = GlobalThreadId::new(1);
    let mut tid_to_pid = HashMap::new();
    tid_to_pid.insert(thread_p, p);
    tid_to_pid.insert(thread_q, q);

    let loop_p = MailboxEventLoop::with_topology(p, 1, 2, tid_to_pid.clone(), HashMap::new());
    let recver_p = CentralRecver::bind("127.0.0.1:0".parse().unwrap(), &loop_p).unwrap();
    let loop_q = MailboxEventLoop::with_topology(q, 1, 2, tid_to_pid, HashMap::new());
    let recver_q = CentralRecver::bind("127.0.0.1:0".parse().unwrap(), &loop_q).unwrap();

    loop_p.register_peer(q, TcpStream::connect(recver_q.bind_addr()).unwrap());
    loop_q.register_peer(p, TcpStream::connect(recver_p.bind_addr()).unwrap());

    let mailbox_p = loop_p.new_mailbox(thread_p);
    let mailbox_q = loop_q.new_mailbox(thread_q);

    let channel = ChannelId::new(5);
    let progress = Progress::new(0);
    mailbox_p.send(
        thread_q,
        channel,
        progress,
        ByteBatch::from_vec(b"hello".to_vec()),
    );
    mailbox_p.send_complete(channel, progress);
    mailbox_q.send_complete(channel, progress);

    assert!(mailbox_q.poll_with_timeout(channel, progress, Duration::from_secs(5)));
    let batch = mailbox_q.recv(channel, progress).unwrap();
    assert_eq!(batch.as_bytes(), b"hello");
    assert!(!mailbox_q.poll_with_timeout(channel, progress, Duration::from_secs(5)));
    assert!(!mailbox_p.poll_with_timeout(channel, progress, Duration::from_secs(5)));

    drop(recver_p);
    drop(recver_q);
}
