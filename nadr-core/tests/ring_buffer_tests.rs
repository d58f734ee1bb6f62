//! Ring buffer integration tests
//!
//! Wraparound, direct-region fallback, and two-thread conservation.

mod helpers;

use helpers::pattern;
use nadr_core::playback::ByteRing;
use std::thread;

#[test]
fn test_wraparound_900_800_200() {
    let (mut tx, mut rx, _) = ByteRing::new(1024).unwrap().split();

    assert_eq!(tx.push(&pattern(0, 900)), 900);
    let mut out = vec![0u8; 800];
    assert_eq!(rx.pop(&mut out), 800);
    assert_eq!(out, pattern(0, 800));

    // Crosses the end of the ring: 124 bytes at the tail, 76 at the head
    assert_eq!(tx.push(&pattern(900, 200)), 200);
    assert_eq!(rx.available(), 300);
    assert_eq!(rx.available() + rx.free_space(), 1023);

    {
        let session = rx.session().unwrap();
        // Enough data, but not contiguous: a wrap, not an underrun
        assert!(session.direct_read_region(300).is_none());
        assert!(session.available() >= 300);
        assert_eq!(session.direct_read_region(224).unwrap(), &pattern(800, 224)[..]);
    }

    let mut out = vec![0u8; 300];
    assert_eq!(rx.pop(&mut out), 300);
    assert_eq!(out, pattern(800, 300));
    assert_eq!(rx.available(), 0);
}

#[test]
fn test_direct_write_falls_back_near_end() {
    let (mut tx, mut rx, _) = ByteRing::new(1024).unwrap().split();

    // Move both cursors to 984
    tx.push(&pattern(0, 984));
    let mut sink = vec![0u8; 984];
    rx.pop(&mut sink);

    {
        let mut session = tx.session().unwrap();
        assert_eq!(session.free_space(), 1023);
        // Only 40 contiguous bytes before the end
        assert!(session.direct_write_region(64).is_none());
        assert!(session.direct_write_region(40).is_some());

        // The copying path wraps instead
        assert_eq!(session.push(&pattern(1000, 64)), 64);
    }

    let mut out = vec![0u8; 64];
    assert_eq!(rx.pop(&mut out), 64);
    assert_eq!(out, pattern(1000, 64));
}

#[test]
fn test_direct_regions_round_trip_across_wrap() {
    let (mut tx, mut rx, _) = ByteRing::new(256).unwrap().split();
    let mut written = 0usize;
    let mut read = 0usize;

    for step in 0..200 {
        let want = 16 + (step * 13) % 48;
        {
            let mut session = tx.session().unwrap();
            match session.direct_write_region(want) {
                Some(region) => {
                    region.copy_from_slice(&pattern(written, want));
                    session.commit_write(want);
                }
                None => {
                    session.push(&pattern(written, want.min(session.free_space())));
                }
            }
        }
        written = tx.ring().counters().snapshot().bytes_pushed as usize;

        let mut session = rx.session().unwrap();
        let take = session.available().min(40);
        if let Some(region) = session.direct_read_region(take) {
            assert_eq!(region, &pattern(read, take)[..]);
            session.advance_read(take);
        } else {
            let mut out = vec![0u8; take];
            session.pop(&mut out);
            assert_eq!(out, pattern(read, take));
        }
        read += take;
    }
    assert!(read > 1024);
}

#[test]
fn test_concurrent_spsc_conservation() {
    const TOTAL: usize = 4 * 1024 * 1024;
    let (mut tx, mut rx, control) = ByteRing::new(4096).unwrap().split();

    let producer = thread::spawn(move || {
        let mut sent = 0usize;
        let mut step = 0usize;
        while sent < TOTAL {
            let len = (1 + (step * 37) % 700).min(TOTAL - sent);
            sent += tx.push(&pattern(sent, len));
            step += 1;
            if step % 64 == 0 {
                thread::yield_now();
            }
        }
        sent
    });

    let consumer = thread::spawn(move || {
        let mut received = 0usize;
        let mut buf = vec![0u8; 1024];
        let mut step = 0usize;
        while received < TOTAL {
            let want = 1 + (step * 53) % 1024;
            let n = rx.pop(&mut buf[..want]);
            for (i, &b) in buf[..n].iter().enumerate() {
                assert_eq!(b, helpers::pattern_byte(received + i), "corrupt byte at {}", received + i);
            }
            received += n;
            step += 1;
            if n == 0 {
                thread::yield_now();
            }
        }
        received
    });

    assert_eq!(producer.join().unwrap(), TOTAL);
    assert_eq!(consumer.join().unwrap(), TOTAL);

    let stats = control.stats();
    assert_eq!(stats.available, 0);
    assert_eq!(stats.counters.bytes_pushed, TOTAL as u64);
}

#[test]
fn test_region_read_in_place_stays_unwritable_until_advanced() {
    let (mut tx, mut rx, _) = ByteRing::new(16).unwrap().split();
    assert_eq!(tx.push(&[1; 15]), 15);

    let mut session = rx.session().unwrap();
    let region = session.direct_read_region(8).unwrap();
    // Full ring: the producer cannot touch the region being read
    assert_eq!(tx.push(&[9; 15]), 0);
    assert_eq!(region, &[1; 8]);

    assert_eq!(session.advance_read(8), 8);
    drop(session);

    assert_eq!(tx.push(&[9; 15]), 8);
    let mut out = [0u8; 15];
    assert_eq!(rx.pop(&mut out), 15);
    assert_eq!(&out[..7], &[1; 7]);
    assert_eq!(&out[7..], &[9; 8]);
}
