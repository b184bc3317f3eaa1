//! Hand a file descriptor from one channel end to the other.
//!
//! Run with: cargo run --example fd-handoff

use std::io::{Read, Seek, SeekFrom, Write};

use imsgkit::{Channel, ReadEvent};

const MSG_OPEN_FILE: u32 = 1;

fn main() {
    let (mut parent, mut child) = Channel::pair().expect("socket pair");

    // "Parent" side: open a file, write into it, pass it across.
    let path = std::env::temp_dir().join(format!("imsgkit-handoff-{}", std::process::id()));
    let mut file = std::fs::File::options()
        .create(true)
        .truncate(true)
        .read(true)
        .write(true)
        .open(&path)
        .expect("open scratch file");
    file.write_all(b"handed over\n").expect("write");

    parent
        .compose(MSG_OPEN_FILE, 7, 0, b"scratch", Some(file.into()))
        .expect("compose");
    parent.flush().expect("flush");

    // "Child" side: read the message, claim the descriptor, use it.
    loop {
        match child.read_once().expect("read") {
            ReadEvent::Data(_) => break,
            ReadEvent::WouldBlock => continue,
            ReadEvent::Closed => panic!("peer closed"),
        }
    }
    let mut msg = child.next_message().expect("parse").expect("complete frame");
    println!(
        "received type={} peer_id={} from pid {} ({} payload bytes)",
        msg.msg_type(),
        msg.peer_id(),
        msg.pid(),
        msg.len()
    );

    let mut received = std::fs::File::from(msg.take_fd().expect("descriptor"));
    received.seek(SeekFrom::Start(0)).expect("seek");
    let mut contents = String::new();
    received.read_to_string(&mut contents).expect("read back");
    print!("file says: {contents}");

    let _ = std::fs::remove_file(&path);
}
