use bitlog::{Config, Store};
use test_log::test;

fn config() -> Config {
    Config::new().without_watchdog()
}

#[test]
fn overwritten_value_survives_reopen() -> bitlog::Result<()> {
    let dir = tempfile::tempdir()?;

    {
        let store = Store::open(dir.path(), config())?;
        store.put(b"a", b"1")?;
        store.put(b"a", b"22")?;
        store.close();
    }

    let store = Store::open(dir.path(), config())?;
    assert_eq!(store.get(b"a")?.as_deref(), Some(b"22".as_slice()));

    // 12-byte header + 1-byte key + 2-byte value, the last surviving record for "a".
    let stats = store.stats();
    assert_eq!(stats.live_bytes, 12 + 1 + 2);

    Ok(())
}

#[test]
fn deleted_key_stays_absent_after_reopen() -> bitlog::Result<()> {
    let dir = tempfile::tempdir()?;

    {
        let store = Store::open(dir.path(), config())?;
        store.put(b"a", b"x")?;
        store.delete(b"a")?;
        store.close();
    }

    let store = Store::open(dir.path(), config())?;
    assert_eq!(store.get(b"a")?, None);

    Ok(())
}

#[test]
fn every_key_observed_before_close_is_observed_identically_after_reopen() -> bitlog::Result<()> {
    let dir = tempfile::tempdir()?;

    let keys: Vec<(&[u8], Option<&[u8]>)> = vec![
        (b"a", Some(b"1".as_slice())),
        (b"b", None),
        (b"c", Some(b"hello world".as_slice())),
        (b"d", Some(b"".as_slice())),
    ];

    {
        let store = Store::open(dir.path(), config())?;
        store.put(b"a", b"1")?;
        store.put(b"b", b"temporary")?;
        store.delete(b"b")?;
        store.put(b"c", b"hello world")?;
        store.put(b"d", b"")?;

        for (key, expected) in &keys {
            assert_eq!(store.get(key)?.as_deref(), *expected);
        }
        store.close();
    }

    let store = Store::open(dir.path(), config())?;
    for (key, expected) in &keys {
        assert_eq!(store.get(key)?.as_deref(), *expected);
    }

    Ok(())
}

#[test]
fn leftover_compaction_temp_file_is_swept_on_open() -> bitlog::Result<()> {
    let dir = tempfile::tempdir()?;

    {
        let store = Store::open(dir.path(), config())?;
        store.put(b"a", b"1")?;
        store.close();
    }

    // An aborted compaction can leave this fixed-name file behind; it holds no
    // published data and must not survive the next open.
    std::fs::write(dir.path().join("wal-compact.tmp"), b"partial shadow segment")?;

    let store = Store::open(dir.path(), config())?;
    assert_eq!(store.get(b"a")?.as_deref(), Some(b"1".as_slice()));
    assert!(!dir.path().join("wal-compact.tmp").exists());

    Ok(())
}

#[test]
fn reopen_resumes_segment_ids_past_rotation() -> bitlog::Result<()> {
    let dir = tempfile::tempdir()?;

    {
        // Tiny segments so several puts force a handful of rotations.
        let store = Store::open(dir.path(), Config::new().without_watchdog().max_segment_size(32))?;
        for i in 0..20 {
            store.put(format!("k{i}").as_bytes(), b"value")?;
        }
        store.close();
    }

    let store = Store::open(dir.path(), config())?;
    for i in 0..20 {
        assert_eq!(
            store.get(format!("k{i}").as_bytes())?.as_deref(),
            Some(b"value".as_slice())
        );
    }

    Ok(())
}
