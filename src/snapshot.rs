//! Native snapshot image.
//!
//! Every committed state is persisted, and every backup written, in this
//! format. All integers are big-endian.
//!
//! ```text
//! image  := magic u32 | version u32 | bucket
//! bucket := count u32 | entry*
//! entry  := tag u8 | key_len u32 | key | payload
//! payload:= value_len u32 | value      (tag 0)
//!         | bucket                     (tag 1)
//! ```

use std::sync::Arc;

use bytes::{Buf, BufMut, BytesMut};

use crate::constants::{MAX_DEPTH, SNAPSHOT_MAGIC, SNAPSHOT_VERSION, TAG_BUCKET, TAG_VALUE};
use crate::error::{Error, Result};
use crate::node::{BucketData, Node};

const HEADER: usize = 8;

/// Encode a root tree into a snapshot image.
pub(crate) fn encode(root: &BucketData) -> Result<BytesMut> {
    let mut buf = BytesMut::with_capacity(HEADER + 4 + root.len() * 16);
    buf.put_u32(SNAPSHOT_MAGIC);
    buf.put_u32(SNAPSHOT_VERSION);
    put_bucket(&mut buf, root, 0)?;
    Ok(buf)
}

/// Decode a snapshot image into a root tree.
pub(crate) fn decode(mut src: &[u8]) -> Result<BucketData> {
    if src.remaining() < HEADER {
        return Err(Error::Invalid);
    }
    if src.get_u32() != SNAPSHOT_MAGIC {
        return Err(Error::Invalid);
    }
    let version = src.get_u32();
    if version != SNAPSHOT_VERSION {
        return Err(Error::VersionMismatch {
            found: version,
            expected: SNAPSHOT_VERSION,
        });
    }

    let root = get_bucket(&mut src, 0)?;
    if src.has_remaining() {
        return Err(Error::Corrupted("trailing bytes after root bucket"));
    }
    // Only buckets live at the top level.
    if root.entries.values().any(|node| !node.is_bucket()) {
        return Err(Error::Corrupted("value stored at the root"));
    }
    Ok(root)
}

/// Length prefix for `len`, refused when it does not fit the format
pub(crate) fn frame_len(len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| Error::EntryTooLarge(len))
}

fn put_bucket(buf: &mut BytesMut, data: &BucketData, depth: usize) -> Result<()> {
    if depth > MAX_DEPTH {
        return Err(Error::NestingTooDeep(MAX_DEPTH));
    }
    buf.put_u32(frame_len(data.len())?);
    for (key, node) in &data.entries {
        match node {
            Node::Value(value) => {
                buf.put_u8(TAG_VALUE);
                put_bytes(buf, key)?;
                put_bytes(buf, value)?;
            }
            Node::Bucket(child) => {
                buf.put_u8(TAG_BUCKET);
                put_bytes(buf, key)?;
                put_bucket(buf, child, depth + 1)?;
            }
        }
    }
    Ok(())
}

fn put_bytes(buf: &mut BytesMut, bytes: &[u8]) -> Result<()> {
    buf.put_u32(frame_len(bytes.len())?);
    buf.put_slice(bytes);
    Ok(())
}

fn get_bucket(src: &mut &[u8], depth: usize) -> Result<BucketData> {
    if depth > MAX_DEPTH {
        return Err(Error::Corrupted("nesting too deep"));
    }
    let count = get_u32(src)?;
    let mut data = BucketData::new();
    let mut prev: Option<Vec<u8>> = None;
    for _ in 0..count {
        if !src.has_remaining() {
            return Err(Error::Corrupted("truncated entry"));
        }
        let tag = src.get_u8();
        let key = get_bytes(src)?;
        if key.is_empty() {
            return Err(Error::Corrupted("empty key"));
        }
        if prev.as_ref().is_some_and(|p| p >= &key) {
            return Err(Error::Corrupted("keys out of order"));
        }
        let node = match tag {
            TAG_VALUE => Node::Value(get_bytes(src)?),
            TAG_BUCKET => Node::Bucket(Arc::new(get_bucket(src, depth + 1)?)),
            _ => return Err(Error::Corrupted("unknown entry tag")),
        };
        prev = Some(key.clone());
        data.entries.insert(key, node);
    }
    Ok(data)
}

fn get_u32(src: &mut &[u8]) -> Result<u32> {
    if src.remaining() < 4 {
        return Err(Error::Corrupted("truncated length"));
    }
    Ok(src.get_u32())
}

fn get_bytes(src: &mut &[u8]) -> Result<Vec<u8>> {
    let len = get_u32(src)? as usize;
    if src.remaining() < len {
        return Err(Error::Corrupted("truncated bytes"));
    }
    let bytes = src[..len].to_vec();
    src.advance(len);
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::MAX_ENTRY_LEN;

    fn sample() -> BucketData {
        let mut nested = BucketData::new();
        nested
            .entries
            .insert(b"n1".to_vec(), Node::Value(b"deep".to_vec()));

        let mut users = BucketData::new();
        users
            .entries
            .insert(b"u1".to_vec(), Node::Value(b"alice".to_vec()));
        users
            .entries
            .insert(b"u2".to_vec(), Node::Value(Vec::new()));
        users
            .entries
            .insert(b"zz".to_vec(), Node::Bucket(Arc::new(nested)));

        let mut root = BucketData::new();
        root.entries
            .insert(b"users".to_vec(), Node::Bucket(Arc::new(users)));
        root.entries
            .insert(b"empty".to_vec(), Node::Bucket(Arc::new(BucketData::new())));
        root
    }

    #[test]
    fn test_encode_decode() {
        let root = sample();
        let image = encode(&root).unwrap();
        assert_eq!(&image[..4], &SNAPSHOT_MAGIC.to_be_bytes());
        assert_eq!(decode(&image).unwrap(), root);
    }

    #[test]
    fn test_empty_root() {
        let image = encode(&BucketData::new()).unwrap();
        assert_eq!(image.len(), HEADER + 4);
        assert_eq!(decode(&image).unwrap().len(), 0);
    }

    #[test]
    fn test_rejects_bad_header() {
        assert!(matches!(decode(b"nope"), Err(Error::Invalid)));

        let mut image = encode(&BucketData::new()).unwrap();
        image[0] ^= 0xff;
        assert!(matches!(decode(&image), Err(Error::Invalid)));

        let mut image = encode(&BucketData::new()).unwrap();
        image[7] = 9;
        assert!(matches!(
            decode(&image),
            Err(Error::VersionMismatch { found: 9, .. })
        ));
    }

    #[test]
    fn test_rejects_truncated_and_trailing() {
        let image = encode(&sample()).unwrap();
        for cut in [HEADER + 2, image.len() / 2, image.len() - 1] {
            assert!(
                matches!(decode(&image[..cut]), Err(Error::Corrupted(_))),
                "cut at {}",
                cut
            );
        }

        let mut longer = image.clone();
        longer.put_u8(0);
        assert!(matches!(decode(&longer), Err(Error::Corrupted(_))));
    }

    /// `depth` buckets named "a", each holding the next
    fn nested_image(depth: usize) -> BytesMut {
        let mut image = BytesMut::new();
        image.put_u32(SNAPSHOT_MAGIC);
        image.put_u32(SNAPSHOT_VERSION);
        for _ in 0..depth {
            image.put_u32(1);
            image.put_u8(TAG_BUCKET);
            image.put_u32(1);
            image.put_u8(b'a');
        }
        image.put_u32(0);
        image
    }

    #[test]
    fn test_rejects_deep_nesting() {
        let root = decode(&nested_image(MAX_DEPTH)).unwrap();
        let path = vec![b"a".to_vec(); MAX_DEPTH];
        assert!(root.resolve(&path).is_some());

        assert!(matches!(
            decode(&nested_image(MAX_DEPTH + 1)),
            Err(Error::Corrupted("nesting too deep"))
        ));
        // deep enough to exhaust the stack if decoding recursed unbounded
        assert!(matches!(
            decode(&nested_image(200_000)),
            Err(Error::Corrupted("nesting too deep"))
        ));
    }

    #[test]
    fn test_frame_len_limit() {
        assert_eq!(frame_len(0).unwrap(), 0);
        assert_eq!(frame_len(MAX_ENTRY_LEN).unwrap(), u32::MAX);
        assert!(matches!(
            frame_len(MAX_ENTRY_LEN + 1),
            Err(Error::EntryTooLarge(_))
        ));
    }

    #[test]
    fn test_rejects_value_at_root() {
        let mut root = BucketData::new();
        root.entries
            .insert(b"stray".to_vec(), Node::Value(b"v".to_vec()));
        let image = encode(&root).unwrap();
        assert!(matches!(decode(&image), Err(Error::Corrupted(_))));
    }
}
