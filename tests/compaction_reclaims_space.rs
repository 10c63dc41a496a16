use bitlog::{Config, Store};
use test_log::test;

fn count_segments(dir: &std::path::Path) -> usize {
    std::fs::read_dir(dir)
        .expect("read dir")
        .filter_map(Result::ok)
        .filter(|entry| entry.file_name().to_string_lossy().starts_with("wal-"))
        .count()
}

#[test]
fn many_overwrites_of_one_key_compact_down_to_two_segments() -> bitlog::Result<()> {
    let dir = tempfile::tempdir()?;
    let store = Store::open(dir.path(), Config::new().without_watchdog())?;

    for i in 1..=50 {
        store.put(b"k", format!("v{i}").as_bytes())?;
    }

    assert!(store.stats().garbage_ratio > 0.5);

    store.compact_now()?;

    assert!(count_segments(dir.path()) <= 2);
    assert_eq!(store.get(b"k")?.as_deref(), Some(b"v50".as_slice()));

    Ok(())
}

#[test]
fn live_bytes_equal_total_bytes_right_after_compaction() -> bitlog::Result<()> {
    let dir = tempfile::tempdir()?;
    let store = Store::open(dir.path(), Config::new().without_watchdog())?;

    for i in 0..30 {
        store.put(format!("k{}", i % 3).as_bytes(), format!("v{i}").as_bytes())?;
    }
    store.delete(b"k0")?;

    store.compact_now()?;

    let stats = store.stats();
    assert_eq!(stats.total_bytes, stats.live_bytes);
    assert_eq!(store.get(b"k0")?, None);
    assert_eq!(store.get(b"k1")?.as_deref(), Some(b"v28".as_slice()));
    assert_eq!(store.get(b"k2")?.as_deref(), Some(b"v29".as_slice()));

    Ok(())
}

#[test]
fn compaction_survives_reopen() -> bitlog::Result<()> {
    let dir = tempfile::tempdir()?;

    {
        let store = Store::open(dir.path(), Config::new().without_watchdog())?;
        for i in 1..=40 {
            store.put(b"k", format!("v{i}").as_bytes())?;
        }
        store.compact_now()?;
        store.close();
    }

    let store = Store::open(dir.path(), Config::new().without_watchdog())?;
    assert_eq!(store.get(b"k")?.as_deref(), Some(b"v40".as_slice()));

    Ok(())
}

#[test]
fn background_watchdog_compacts_without_manual_trigger() -> bitlog::Result<()> {
    let dir = tempfile::tempdir()?;
    let store = Store::open(
        dir.path(),
        Config::new().compaction_check_interval(std::time::Duration::from_millis(50)),
    )?;

    for i in 1..=50 {
        store.put(b"k", format!("v{i}").as_bytes())?;
    }

    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
    loop {
        if store.stats().total_bytes == store.stats().live_bytes {
            break;
        }
        assert!(std::time::Instant::now() < deadline, "compaction did not run in time");
        std::thread::sleep(std::time::Duration::from_millis(20));
    }

    assert_eq!(store.get(b"k")?.as_deref(), Some(b"v50".as_slice()));
    store.close();

    Ok(())
}
