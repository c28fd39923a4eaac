use rustc_hash::FxHashMap;
use tupkv_storage::{
    KvContainer, KvDriver, MemKvDriver, ObjectClass, ObjectId, OidDkey, OpenMode, ReadSet,
    WriteSet, ERR_NONEXIST, ERR_NO_PERM,
};

fn oid(lo: u64) -> ObjectId {
    ObjectId::new(lo, 0)
}

#[test]
fn single_value_roundtrip() {
    let driver = MemKvDriver::new();
    let cont = driver
        .open_container("p", "c", OpenMode::CreateIfAbsent)
        .unwrap();

    cont.write_single(oid(1), 10, 20, None, b"hello").unwrap();

    let mut buf = [0u8; 16];
    let n = cont.read_single(oid(1), 10, 20, None, &mut buf).unwrap();
    assert_eq!(&buf[..n], b"hello");

    // A value larger than the destination is truncated to the buffer.
    let mut small = [0u8; 3];
    let n = cont.read_single(oid(1), 10, 20, None, &mut small).unwrap();
    assert_eq!(n, 3);
    assert_eq!(&small, b"hel");
}

#[test]
fn missing_value_and_container_fail_with_nonexist() {
    let driver = MemKvDriver::new();
    let cont = driver
        .open_container("p", "c", OpenMode::CreateIfAbsent)
        .unwrap();

    let mut buf = [0u8; 4];
    let err = cont.read_single(oid(1), 0, 0, None, &mut buf).unwrap_err();
    assert_eq!(err.code, ERR_NONEXIST);

    let err = driver
        .open_container("p", "other", OpenMode::ReadOnly)
        .unwrap_err();
    assert_eq!(err.code, ERR_NONEXIST);
    let err = driver
        .open_container("nopool", "c", OpenMode::ReadOnly)
        .unwrap_err();
    assert_eq!(err.code, ERR_NONEXIST);
}

#[test]
fn read_only_container_rejects_writes_but_shares_data() {
    let driver = MemKvDriver::new();
    let writer = driver
        .open_container("p", "c", OpenMode::CreateIfAbsent)
        .unwrap();
    writer.write_single(oid(7), 1, 2, None, b"payload").unwrap();

    let reader = driver.open_container("p", "c", OpenMode::ReadOnly).unwrap();
    let mut buf = [0u8; 7];
    let n = reader.read_single(oid(7), 1, 2, None, &mut buf).unwrap();
    assert_eq!(&buf[..n], b"payload");

    let err = reader.write_single(oid(7), 1, 3, None, b"x").unwrap_err();
    assert_eq!(err.code, ERR_NO_PERM);

    let empty = WriteSet::default();
    assert_eq!(reader.write_v(&empty).unwrap_err().code, ERR_NO_PERM);
}

#[test]
fn vectored_io_round_trips_grouped_values() {
    let driver = MemKvDriver::new();
    let cont = driver
        .open_container("p", "c", OpenMode::CreateIfAbsent)
        .unwrap();

    let (a, b, c) = (b"alpha".to_vec(), b"beta".to_vec(), b"gamma".to_vec());
    let mut writes: WriteSet<'_> = WriteSet::default();
    let group1 = OidDkey::new(oid(1), 100);
    let group2 = OidDkey::new(oid(2), 100);
    let mut attrs1: FxHashMap<_, &[u8]> = FxHashMap::default();
    attrs1.insert(0u64, a.as_slice());
    attrs1.insert(1u64, b.as_slice());
    let mut attrs2: FxHashMap<_, &[u8]> = FxHashMap::default();
    attrs2.insert(0u64, c.as_slice());
    writes.insert(group1, attrs1);
    writes.insert(group2, attrs2);
    cont.write_v(&writes).unwrap();

    let mut buf_a = vec![0u8; a.len()];
    let mut buf_b = vec![0u8; b.len()];
    let mut buf_c = vec![0u8; c.len()];
    {
        let mut reads: ReadSet<'_> = ReadSet::default();
        let mut rattrs1: FxHashMap<_, &mut [u8]> = FxHashMap::default();
        rattrs1.insert(0u64, buf_a.as_mut_slice());
        rattrs1.insert(1u64, buf_b.as_mut_slice());
        let mut rattrs2: FxHashMap<_, &mut [u8]> = FxHashMap::default();
        rattrs2.insert(0u64, buf_c.as_mut_slice());
        reads.insert(group1, rattrs1);
        reads.insert(group2, rattrs2);
        cont.read_v(&mut reads).unwrap();
    }
    assert_eq!(buf_a, a);
    assert_eq!(buf_b, b);
    assert_eq!(buf_c, c);
}

#[test]
fn vectored_read_of_missing_value_fails_whole_request() {
    let driver = MemKvDriver::new();
    let cont = driver
        .open_container("p", "c", OpenMode::CreateIfAbsent)
        .unwrap();
    cont.write_single(oid(1), 0, 0, None, b"x").unwrap();

    let mut buf = [0u8; 1];
    let mut reads: ReadSet<'_> = ReadSet::default();
    let mut attrs: FxHashMap<_, &mut [u8]> = FxHashMap::default();
    attrs.insert(99u64, buf.as_mut_slice());
    reads.insert(OidDkey::new(oid(1), 0), attrs);
    assert_eq!(cont.read_v(&mut reads).unwrap_err().code, ERR_NONEXIST);
}

#[test]
fn object_class_registry() {
    let driver = MemKvDriver::new();
    assert!(driver.object_class_known("SX"));
    assert!(driver.object_class_known("RP_3G1"));
    assert!(!driver.object_class_known("NOT_A_CLASS"));

    let driver = MemKvDriver::with_known_classes(["CUSTOM"]);
    assert!(driver.object_class_known("CUSTOM"));
    assert!(!driver.object_class_known("SX"));

    let cont = driver
        .open_container("p", "c", OpenMode::CreateIfAbsent)
        .unwrap();
    cont.set_default_object_class(&ObjectClass::new("CUSTOM"))
        .unwrap();
    assert_eq!(cont.default_object_class().as_str(), "CUSTOM");
}
