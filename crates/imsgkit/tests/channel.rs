//! End-to-end channel behavior over real socket pairs.

use std::io::Write;
use std::os::fd::{AsFd, AsRawFd, OwnedFd};
use std::os::unix::fs::MetadataExt;
use std::os::unix::net::UnixStream;

use imsgkit::{
    Channel, ChannelConfig, FlushEvent, Header, ImsgError, ReadEvent, WriteEvent, FLAG_HAS_FD,
    HEADER_SIZE,
};

/// Create a file with known contents and return it plus (dev, ino).
fn tagged_file(tag: &str, contents: &[u8]) -> (std::fs::File, (u64, u64)) {
    let path = std::env::temp_dir().join(format!("imsgkit-test-{}-{}", std::process::id(), tag));
    let mut file = std::fs::File::options()
        .create(true)
        .truncate(true)
        .read(true)
        .write(true)
        .open(&path)
        .unwrap();
    file.write_all(contents).unwrap();
    let meta = file.metadata().unwrap();
    let id = (meta.dev(), meta.ino());
    let _ = std::fs::remove_file(&path);
    (file, id)
}

fn drain_reads(chan: &mut Channel) {
    loop {
        match chan.read_once().unwrap() {
            ReadEvent::Data(_) => {}
            ReadEvent::WouldBlock | ReadEvent::Closed => break,
        }
    }
}

#[test]
fn roundtrip_with_descriptor() {
    let (mut a, mut b) = Channel::pair().unwrap();

    let (file, id) = tagged_file("roundtrip", b"tagged");
    a.compose(1, 42, 0, b"hello", Some(file.into())).unwrap();
    assert_eq!(a.flush().unwrap(), FlushEvent::Drained);

    drain_reads(&mut b);
    let mut msg = b.next_message().unwrap().unwrap();

    assert_eq!(msg.msg_type(), 1);
    assert_eq!(msg.peer_id(), 42);
    assert_eq!(msg.pid(), std::process::id());
    assert_eq!(msg.data(), b"hello");
    assert_eq!(msg.len(), 5);

    // The transferred descriptor refers to the same underlying file.
    let received = std::fs::File::from(msg.take_fd().unwrap());
    let meta = received.metadata().unwrap();
    assert_eq!((meta.dev(), meta.ino()), id);
    assert!(msg.take_fd().is_none());
}

#[test]
fn compose_vectored_concatenates_parts() {
    let (mut a, mut b) = Channel::pair().unwrap();

    a.compose_vectored(7, 0, 0, &[b"he", b"l", b"lo"], None)
        .unwrap();
    a.flush().unwrap();

    drain_reads(&mut b);
    let msg = b.next_message().unwrap().unwrap();
    assert_eq!(msg.data(), b"hello");
    assert!(!msg.has_fd());
}

#[test]
fn three_step_builder() {
    let (mut a, mut b) = Channel::pair().unwrap();

    let (file, id) = tagged_file("builder", b"x");
    let mut builder = a.builder(9, 5, 0).unwrap();
    builder.add(b"part-one ").unwrap();
    builder.add(b"part-two").unwrap();
    builder.attach_fd(OwnedFd::from(file)).unwrap();
    builder.finish().unwrap();
    a.flush().unwrap();

    drain_reads(&mut b);
    let mut msg = b.next_message().unwrap().unwrap();
    assert_eq!(msg.msg_type(), 9);
    assert_eq!(msg.data(), b"part-one part-two");
    assert!(msg.header().has_fd());

    let received = std::fs::File::from(msg.take_fd().unwrap());
    let meta = received.metadata().unwrap();
    assert_eq!((meta.dev(), meta.ino()), id);
}

#[test]
fn descriptors_match_frames_in_arrival_order() {
    let (mut a, mut b) = Channel::pair().unwrap();

    let (one, id_one) = tagged_file("order-one", b"one");
    let (two, id_two) = tagged_file("order-two", b"two");
    assert_ne!(id_one, id_two);

    a.compose(1, 0, 0, b"first", Some(one.into())).unwrap();
    a.compose(2, 0, 0, b"second", Some(two.into())).unwrap();
    assert_eq!(a.flush().unwrap(), FlushEvent::Drained);

    // Ancillary data is a read barrier, so each frame may need its own
    // recvmsg; keep reading until both messages are out.
    let mut msgs = Vec::new();
    while msgs.len() < 2 {
        drain_reads(&mut b);
        while let Some(msg) = b.next_message().unwrap() {
            msgs.push(msg);
        }
    }

    let meta1 = std::fs::File::from(msgs[0].take_fd().unwrap())
        .metadata()
        .unwrap();
    let meta2 = std::fs::File::from(msgs[1].take_fd().unwrap())
        .metadata()
        .unwrap();

    assert_eq!(msgs[0].msg_type(), 1);
    assert_eq!((meta1.dev(), meta1.ino()), id_one);
    assert_eq!(msgs[1].msg_type(), 2);
    assert_eq!((meta2.dev(), meta2.ino()), id_two);
}

#[test]
fn chunked_reads_need_more_data_until_complete() {
    let (sock_a, sock_b) = imsgkit_sockio::socket_pair().unwrap();
    let mut chan = Channel::new(sock_b);
    let mut raw: UnixStream = sock_a.into();

    let hdr = Header {
        msg_type: 3,
        len: (HEADER_SIZE + 5) as u32,
        flags: 0,
        peer_id: 8,
        pid: 77,
    };
    let mut frame = imsgkit::wire::encode_header(&hdr).to_vec();
    frame.extend_from_slice(b"hello");

    // First three bytes: not even a header yet.
    raw.write_all(&frame[..3]).unwrap();
    assert!(matches!(chan.read_once().unwrap(), ReadEvent::Data(3)));
    assert!(chan.next_message().unwrap().is_none());

    // Up to one byte short of the full frame.
    raw.write_all(&frame[3..frame.len() - 1]).unwrap();
    drain_reads(&mut chan);
    assert!(chan.next_message().unwrap().is_none());

    // Final byte completes the frame.
    raw.write_all(&frame[frame.len() - 1..]).unwrap();
    drain_reads(&mut chan);
    let msg = chan.next_message().unwrap().unwrap();
    assert_eq!(msg.msg_type(), 3);
    assert_eq!(msg.peer_id(), 8);
    assert_eq!(msg.pid(), 77);
    assert_eq!(msg.data(), b"hello");
}

#[test]
fn partial_writes_resume_on_the_head_buffer() {
    let (sock_a, sock_b) = imsgkit_sockio::socket_pair().unwrap();

    // Shrink the send buffer so a large frame cannot go out in one call.
    let small: libc::c_int = 4096;
    // SAFETY: setsockopt with a valid int option value.
    let rc = unsafe {
        libc::setsockopt(
            sock_a.as_raw_fd(),
            libc::SOL_SOCKET,
            libc::SO_SNDBUF,
            std::ptr::from_ref(&small).cast(),
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    assert_eq!(rc, 0);

    let mut a = Channel::new(sock_a);
    let mut b = Channel::new(sock_b);

    let payload: Vec<u8> = (0..1024 * 1024).map(|i| (i % 251) as u8).collect();
    a.compose(11, 0, 0, &payload, None).unwrap();
    let total = a.queued_len();
    assert_eq!(total, HEADER_SIZE + payload.len());

    // The first write cannot cover the whole frame.
    match a.write_once().unwrap() {
        WriteEvent::Wrote(n) => assert!(n < total),
        WriteEvent::WouldBlock => {}
    }

    let mut msg = None;
    let mut rounds = 0;
    while msg.is_none() {
        rounds += 1;
        assert!(rounds < 100_000, "transfer made no progress");
        let _ = a.write_once().unwrap();
        drain_reads(&mut b);
        msg = b.next_message().unwrap();
    }

    let msg = msg.unwrap();
    assert_eq!(msg.msg_type(), 11);
    assert_eq!(msg.data(), payload.as_slice());
    assert_eq!(a.queued_len(), 0);
}

#[test]
fn oversized_compose_enqueues_nothing() {
    let (sock_a, _sock_b) = imsgkit_sockio::socket_pair().unwrap();
    let mut a = Channel::with_config(
        sock_a,
        ChannelConfig {
            max_frame_size: 64,
        },
    );

    let err = a.compose(1, 0, 0, &[0u8; 128], None).unwrap_err();
    assert!(matches!(err, ImsgError::FrameLengthOutOfRange { .. }));
    assert_eq!(a.queued_len(), 0);
    assert_eq!(a.pending(), 0);
}

#[test]
fn parser_rejects_out_of_range_lengths() {
    let (sock_a, sock_b) = imsgkit_sockio::socket_pair().unwrap();
    let mut chan = Channel::new(sock_b);
    let mut raw: UnixStream = sock_a.into();

    let hdr = Header {
        msg_type: 1,
        len: 4, // below the header size
        flags: 0,
        peer_id: 0,
        pid: 0,
    };
    raw.write_all(&imsgkit::wire::encode_header(&hdr)).unwrap();

    drain_reads(&mut chan);
    let err = chan.next_message().unwrap_err();
    assert!(matches!(err, ImsgError::FrameLengthOutOfRange { len: 4, .. }));
}

#[test]
fn eof_is_sticky_and_buffered_frames_survive_it() {
    let (mut a, mut b) = Channel::pair().unwrap();

    a.compose(5, 0, 0, b"last words", None).unwrap();
    a.flush().unwrap();
    drop(a);

    // Buffered bytes first, then a sticky Closed.
    let mut saw_data = false;
    loop {
        match b.read_once().unwrap() {
            ReadEvent::Data(_) => saw_data = true,
            ReadEvent::Closed => break,
            ReadEvent::WouldBlock => {}
        }
    }
    assert!(saw_data);
    assert_eq!(b.read_once().unwrap(), ReadEvent::Closed);
    assert_eq!(b.read_once().unwrap(), ReadEvent::Closed);

    let msg = b.next_message().unwrap().unwrap();
    assert_eq!(msg.data(), b"last words");
    assert!(b.next_message().unwrap().is_none());
}

#[test]
fn teardown_closes_unsent_descriptors() {
    let (mut a, _b) = Channel::pair().unwrap();

    let (file, _) = tagged_file("teardown", b"leak-check");
    let fd = OwnedFd::from(file);
    let raw = fd.as_raw_fd();

    a.compose(1, 0, 0, b"never sent", Some(fd)).unwrap();
    assert_eq!(a.pending(), 1);
    drop(a);

    // SAFETY: probing a descriptor number we expect to be closed.
    let rc = unsafe { libc::fcntl(raw, libc::F_GETFD) };
    assert_eq!(rc, -1);
}

#[test]
fn dropped_message_closes_unclaimed_descriptor() {
    let (mut a, mut b) = Channel::pair().unwrap();

    let (file, _) = tagged_file("msg-drop", b"unclaimed");
    a.compose(1, 0, 0, b"with-fd", Some(file.into())).unwrap();
    a.flush().unwrap();

    drain_reads(&mut b);
    let msg = b.next_message().unwrap().unwrap();
    let raw = msg.fd().unwrap().as_raw_fd();
    drop(msg); // descriptor never taken

    // SAFETY: probing a descriptor number we expect to be closed.
    let rc = unsafe { libc::fcntl(raw, libc::F_GETFD) };
    assert_eq!(rc, -1);
}

#[test]
fn forward_strips_the_descriptor() {
    let (mut a, mut b) = Channel::pair().unwrap();
    let (mut c, mut d) = Channel::pair().unwrap();

    let (file, _) = tagged_file("forward", b"secret");
    a.compose(21, 9, 0, b"payload", Some(file.into())).unwrap();
    a.flush().unwrap();

    drain_reads(&mut b);
    let msg = b.next_message().unwrap().unwrap();
    assert!(msg.has_fd());

    c.forward(&msg).unwrap();
    c.flush().unwrap();

    drain_reads(&mut d);
    let mut forwarded = d.next_message().unwrap().unwrap();
    assert_eq!(forwarded.msg_type(), 21);
    assert_eq!(forwarded.peer_id(), 9);
    assert_eq!(forwarded.pid(), msg.pid());
    assert_eq!(forwarded.data(), b"payload");
    assert_eq!(forwarded.header().flags & FLAG_HAS_FD, 0);
    assert!(forwarded.take_fd().is_none());
}

#[test]
fn missing_claimed_descriptor_is_lenient_but_counted() {
    let (sock_a, sock_b) = imsgkit_sockio::socket_pair().unwrap();
    let mut chan = Channel::new(sock_b);
    let mut raw: UnixStream = sock_a.into();

    // A frame that claims a descriptor, sent without any ancillary data.
    let hdr = Header {
        msg_type: 2,
        len: HEADER_SIZE as u32,
        flags: FLAG_HAS_FD,
        peer_id: 0,
        pid: 1,
    };
    raw.write_all(&imsgkit::wire::encode_header(&hdr)).unwrap();

    drain_reads(&mut chan);
    let mut msg = chan.next_message().unwrap().unwrap();
    assert!(msg.take_fd().is_none());
    assert_eq!(chan.fd_shortfall(), 1);
}

#[test]
fn channel_exposes_its_socket_for_polling() {
    let (a, _b) = Channel::pair().unwrap();
    assert!(a.as_fd().as_raw_fd() >= 0);
}
