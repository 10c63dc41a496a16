use bitlog::{Config, Store};
use test_log::test;

#[test]
fn put_and_get_distinct_keys() -> bitlog::Result<()> {
    let dir = tempfile::tempdir()?;
    let store = Store::open(dir.path(), Config::new().without_watchdog())?;

    store.put(b"a", b"1")?;
    store.put(b"b", b"2")?;

    assert_eq!(store.get(b"a")?.as_deref(), Some(b"1".as_slice()));
    assert_eq!(store.get(b"b")?.as_deref(), Some(b"2".as_slice()));
    assert_eq!(store.get(b"c")?, None);

    Ok(())
}

#[test]
fn overwriting_a_key_returns_the_latest_value() -> bitlog::Result<()> {
    let dir = tempfile::tempdir()?;
    let store = Store::open(dir.path(), Config::new().without_watchdog())?;

    store.put(b"a", b"1")?;
    store.put(b"a", b"22")?;

    assert_eq!(store.get(b"a")?.as_deref(), Some(b"22".as_slice()));

    let stats = store.stats();
    assert_eq!(stats.key_count, 1);

    Ok(())
}

#[test]
fn deleting_a_key_makes_it_not_found() -> bitlog::Result<()> {
    let dir = tempfile::tempdir()?;
    let store = Store::open(dir.path(), Config::new().without_watchdog())?;

    store.put(b"a", b"x")?;
    store.delete(b"a")?;

    assert_eq!(store.get(b"a")?, None);

    Ok(())
}

#[test]
fn empty_value_is_distinct_from_not_found() -> bitlog::Result<()> {
    let dir = tempfile::tempdir()?;
    let store = Store::open(dir.path(), Config::new().without_watchdog())?;

    store.put(b"a", b"")?;

    assert_eq!(store.get(b"a")?.as_deref(), Some(b"".as_slice()));

    Ok(())
}
