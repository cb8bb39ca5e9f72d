use std::fmt;

use blake3::Hasher;

/// 128-bit content digest of a value.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Digest([u8; 16]);

/// Incremental builder for [`Digest`]s.
///
/// Variable-length items are length-prefixed so that adjacent items never alias.
#[derive(Clone)]
pub struct DigestBuilder(Hasher);

impl Digest {
    /// Digest of a value known only by its name, such as a graph input or an initializer.
    pub fn of_name(name: &str) -> Self {
        let mut h = DigestBuilder::new();
        h.update_str(name);
        h.finish()
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({self})")
    }
}

impl Default for DigestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DigestBuilder {
    pub fn new() -> Self {
        Self(Hasher::new())
    }

    pub fn update_digest(&mut self, digest: &Digest) -> &mut Self {
        self.0.update(&digest.0);
        self
    }

    pub fn update_u8(&mut self, x: u8) -> &mut Self {
        self.0.update(&[x]);
        self
    }

    /// Feeds the number of items that follow.
    pub fn update_len(&mut self, len: usize) -> &mut Self {
        self.0.update(&(len as u64).to_le_bytes());
        self
    }

    pub fn update_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.update_len(bytes.len());
        self.0.update(bytes);
        self
    }

    pub fn update_str(&mut self, s: &str) -> &mut Self {
        self.update_bytes(s.as_bytes())
    }

    pub fn finish(&self) -> Digest {
        let mut digest = [0u8; 16];
        digest.copy_from_slice(&self.0.finalize().as_bytes()[..16]);
        Digest(digest)
    }

    /// Finishes a copy of this builder extended with an output slot index.
    pub fn finish_slot(&self, slot: usize) -> Digest {
        let mut h = self.clone();
        h.0.update(&(slot as u64).to_le_bytes());
        h.finish()
    }
}

#[test]
fn length_prefix_separates_items() {
    let mut a = DigestBuilder::new();
    a.update_str("Ad").update_str("d");
    let mut b = DigestBuilder::new();
    b.update_str("A").update_str("dd");
    assert_ne!(a.finish(), b.finish());
}

#[test]
fn slots_do_not_collide() {
    let mut h = DigestBuilder::new();
    h.update_str("Split");
    assert_ne!(h.finish_slot(0), h.finish_slot(1));
    assert_eq!(h.finish_slot(1), h.clone().finish_slot(1));
}

#[test]
fn name_digest_is_stable() {
    assert_eq!(Digest::of_name("x"), Digest::of_name("x"));
    assert_ne!(Digest::of_name("x"), Digest::of_name("y"));
    assert_eq!(Digest::of_name("x").to_string().len(), 32);
}
