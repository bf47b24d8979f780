use super::*;

#[test]
fn insert_then_release_revokes_once() {
    let store = BlobStore::new();
    let h = store.insert(vec![1, 2, 3]);
    assert!(store.is_alive(h));
    assert_eq!(store.bytes(h).unwrap().as_slice(), &[1, 2, 3]);

    assert!(store.release(h).unwrap());
    assert!(!store.is_alive(h));
    assert!(store.bytes(h).is_err());
    assert_eq!(
        store.stats(),
        BlobStats {
            live: 0,
            release_calls: 1,
            revoked: 1
        }
    );
}

#[test]
fn double_release_is_rejected_and_not_counted() {
    let store = BlobStore::new();
    let h = store.insert(vec![0]);
    store.release(h).unwrap();
    assert!(store.release(h).is_err());
    assert_eq!(store.stats().release_calls, 1);
}

#[test]
fn retained_blob_survives_first_release() {
    let store = BlobStore::new();
    let h = store.insert(vec![7]);
    store.retain(h).unwrap();
    assert!(!store.release(h).unwrap());
    assert!(store.is_alive(h));
    assert!(store.release(h).unwrap());
    assert_eq!(store.stats().revoked, 1);
}

#[test]
fn handles_are_never_reused() {
    let store = BlobStore::new();
    let a = store.insert(vec![]);
    store.release(a).unwrap();
    let b = store.insert(vec![]);
    assert_ne!(a, b);
    assert_eq!(b.to_string(), format!("blob:livery/{}", b.as_u64()));
}
