use std::fs::File;

use lumokv::{Error, KeyValue, MemoryBackend, Store, StoreFlags, TraceContext};
use tempfile::TempDir;

fn populate(store: &Store) {
    store
        .update(&TraceContext::new(), |tx| {
            let users = tx.bucket(b"users")?;
            for i in 0..50u32 {
                users.put(format!("user{:02}", i).as_bytes(), &i.to_be_bytes())?;
            }
            let orgs = tx.bucket(b"orgs")?;
            orgs.put(b"acme", b"gold")?;
            orgs.create_bucket(b"members")?.put(b"user01", b"owner")?;
            tx.bucket(b"empty")?;
            Ok::<_, Error>(())
        })
        .unwrap();
}

/// Every bucket's full ordered contents, nested buckets flattened by path
fn dump(store: &Store) -> Vec<(Vec<u8>, Vec<KeyValue>)> {
    store
        .view(&TraceContext::new(), |tx| {
            let mut out = Vec::new();
            for name in tx.bucket_names() {
                let mut pending = vec![tx.get_bucket(&name)?];
                while let Some(bucket) = pending.pop() {
                    let mut entries = Vec::new();
                    let mut cursor = bucket.cursor(&[])?;
                    let mut kv = cursor.first();
                    while let Some((key, value)) = kv {
                        if bucket.is_bucket(&key) {
                            pending.push(bucket.bucket(&key)?);
                        }
                        entries.push((key, value));
                        kv = cursor.next();
                    }
                    out.push((bucket.path().concat(), entries));
                }
            }
            Ok::<_, Error>(out)
        })
        .unwrap()
}

#[test]
fn test_backup_restores_through_file() {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = TempDir::new().unwrap();

    let mut source = Store::new(dir.path().join("source.db"));
    source.open().unwrap();
    populate(&source);

    let restored_path = dir.path().join("restored.db");
    let mut file = File::create(&restored_path).unwrap();
    let written = source.backup(&TraceContext::new(), &mut file).unwrap();
    drop(file);
    assert_eq!(written, restored_path.metadata().unwrap().len());

    let mut restored = Store::with_flags(&restored_path, StoreFlags::RDONLY);
    restored.open().unwrap();
    assert_eq!(dump(&source), dump(&restored));
}

#[test]
fn test_backup_restores_in_memory() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut source = Store::in_memory();
    source.open().unwrap();
    populate(&source);

    let mut image = Vec::new();
    source.backup(&TraceContext::new(), &mut image).unwrap();

    let mut restored = Store::with_backend(
        MemoryBackend::from_bytes(image).unwrap(),
        StoreFlags::empty(),
    );
    restored.open().unwrap();
    let expected = dump(&source);
    assert_eq!(expected, dump(&restored));
    assert_eq!(expected.len(), 4);
}

#[test]
fn test_backup_of_empty_store() {
    let mut store = Store::in_memory();
    store.open().unwrap();

    let mut image = Vec::new();
    let written = store.backup(&TraceContext::new(), &mut image).unwrap();
    assert_eq!(written, 12);
    assert_eq!(&image[..4], &lumokv::SNAPSHOT_MAGIC.to_be_bytes());
}

#[test]
fn test_corrupt_image_is_rejected() {
    let mut store = Store::in_memory();
    store.open().unwrap();
    populate(&store);

    let mut image = Vec::new();
    store.backup(&TraceContext::new(), &mut image).unwrap();
    image.truncate(image.len() - 3);

    let err = MemoryBackend::from_bytes(image).unwrap_err();
    assert!(matches!(err, Error::Corrupted(_)));
}

#[test]
fn test_deeply_nested_image_is_rejected() {
    let mut image = Vec::new();
    image.extend_from_slice(&lumokv::SNAPSHOT_MAGIC.to_be_bytes());
    image.extend_from_slice(&lumokv::SNAPSHOT_VERSION.to_be_bytes());
    for _ in 0..200_000 {
        image.extend_from_slice(&1u32.to_be_bytes());
        image.push(1);
        image.extend_from_slice(&1u32.to_be_bytes());
        image.push(b'a');
    }
    image.extend_from_slice(&0u32.to_be_bytes());

    let err = MemoryBackend::from_bytes(image).unwrap_err();
    assert!(matches!(err, Error::Corrupted(_)));
}
