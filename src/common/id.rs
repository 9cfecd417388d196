//! Kademlia node Id or a lookup target
use std::{
    cmp::Ordering,
    convert::TryFrom,
    fmt::{self, Debug, Display, Formatter},
};

use bytes::Bytes;
use rand::RngCore;

use crate::{Error, Result};

#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "Bytes", into = "Bytes")
)]
/// Kademlia node Id or a lookup target.
///
/// An immutable bit string of the network-wide id length. Cloning is cheap,
/// every derived value ([Id::flip_bit], [Id::xor], [Id::add]) is a fresh copy.
///
/// `Ord` is the big-endian byte order, so comparing two XOR distances with
/// `cmp` tells which one is closer.
pub struct Id(Bytes);

impl Id {
    /// Create a random Id of `len` bytes.
    pub fn random(len: usize) -> Id {
        let mut bytes = vec![0; len];
        rand::thread_rng().fill_bytes(&mut bytes);

        Id(bytes.into())
    }

    /// Create a new Id from some bytes. Returns Err if `bytes` is empty.
    pub fn from_bytes<T: AsRef<[u8]>>(bytes: T) -> Result<Id> {
        let bytes = bytes.as_ref();
        if bytes.is_empty() {
            return Err(Error::InvalidIdSize(0));
        }

        Ok(Id(Bytes::copy_from_slice(bytes)))
    }

    // === Getters ===

    /// Length of this Id in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false for Ids built through [Id::from_bytes].
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Length of this Id in bits.
    pub fn bits(&self) -> usize {
        self.0.len() * 8
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }

    /// Returns the bit at `idx`, counting from the most significant bit of the first byte.
    ///
    /// # Panics
    ///
    /// If `idx` is not smaller than [Id::bits].
    pub fn bit(&self, idx: usize) -> u8 {
        (self.0[idx >> 3] >> (7 - (idx & 7))) & 1
    }

    /// Number of leading zero bits.
    ///
    /// For a XOR distance this is the length of the prefix both ends share.
    pub fn leading_zeros(&self) -> u32 {
        let mut zeros = 0;

        for byte in self.0.iter() {
            if *byte != 0 {
                return zeros + byte.leading_zeros();
            }
            zeros += 8;
        }

        zeros
    }

    // === Public Methods ===

    /// Returns Err if `other` has a different length.
    pub fn check_len(&self, other: &Id) -> Result<()> {
        if self.len() != other.len() {
            return Err(Error::IdLengthMismatch {
                expected: self.len(),
                actual: other.len(),
            });
        }

        Ok(())
    }

    /// XOR distance between this Id and `other`.
    pub fn xor(&self, other: &Id) -> Result<Id> {
        self.check_len(other)?;

        Ok(self.distance(other))
    }

    /// Compare two Ids in big-endian byte order.
    pub fn compare(&self, other: &Id) -> Result<Ordering> {
        self.check_len(other)?;

        Ok(self.0.cmp(&other.0))
    }

    /// Returns a copy of this Id with the bit at `idx` flipped.
    ///
    /// # Panics
    ///
    /// If `idx` is not smaller than [Id::bits].
    pub fn flip_bit(&self, idx: usize) -> Id {
        let mut bytes = self.0.to_vec();
        bytes[idx >> 3] ^= 128 >> (idx & 7);

        Id(bytes.into())
    }

    /// Big-endian addition, carrying from the last byte towards the first.
    ///
    /// A carry out of the first byte is dropped, so the sum wraps around.
    pub fn add(&self, other: &Id) -> Result<Id> {
        self.check_len(other)?;

        let mut bytes = vec![0; self.len()];
        let mut carry = 0_u16;

        for i in (0..self.len()).rev() {
            let sum = self.0[i] as u16 + other.0[i] as u16 + carry;
            carry = sum >> 8;
            bytes[i] = sum as u8;
        }

        Ok(Id(bytes.into()))
    }

    // === Crate Methods ===

    /// XOR distance for Ids already known to share a length.
    pub(crate) fn distance(&self, other: &Id) -> Id {
        debug_assert_eq!(self.len(), other.len());

        Id(self
            .0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| a ^ b)
            .collect::<Vec<u8>>()
            .into())
    }

    /// Orders `a` and `b` by their distance to self, without allocating.
    pub(crate) fn distance_cmp(&self, a: &Id, b: &Id) -> Ordering {
        for ((s, a), b) in self.0.iter().zip(a.0.iter()).zip(b.0.iter()) {
            match (s ^ a).cmp(&(s ^ b)) {
                Ordering::Equal => continue,
                ordering => return ordering,
            }
        }

        Ordering::Equal
    }

    /// Returns true if `a` is strictly closer to self than `b`.
    pub(crate) fn is_closer(&self, a: &Id, b: &Id) -> bool {
        self.distance_cmp(a, b) == Ordering::Less
    }
}

impl TryFrom<Bytes> for Id {
    type Error = Error;

    fn try_from(bytes: Bytes) -> Result<Self> {
        if bytes.is_empty() {
            return Err(Error::InvalidIdSize(0));
        }

        Ok(Id(bytes))
    }
}

impl From<Id> for Bytes {
    fn from(id: Id) -> Self {
        id.0
    }
}

impl AsRef<[u8]> for Id {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Display for Id {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for byte in self.0.iter() {
            write!(f, "{byte:02x}")?;
        }

        Ok(())
    }
}

impl Debug for Id {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Id({self})")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn id(bytes: &[u8]) -> Id {
        Id::from_bytes(bytes).unwrap()
    }

    #[test]
    fn xor_is_symmetric() {
        for len in 1..40 {
            let a = Id::random(len);
            let b = Id::random(len);

            assert_eq!(a.xor(&b).unwrap(), b.xor(&a).unwrap());
            assert_eq!(a.compare(&a).unwrap(), Ordering::Equal);

            let zero = a.xor(&a).unwrap();
            assert!(zero.as_bytes().iter().all(|b| *b == 0));
            assert_eq!(zero.leading_zeros() as usize, zero.bits());
        }
    }

    #[test]
    fn length_mismatch() {
        let a = Id::random(3);
        let b = Id::random(4);

        assert_eq!(
            a.xor(&b),
            Err(Error::IdLengthMismatch {
                expected: 3,
                actual: 4
            })
        );
        assert!(a.compare(&b).is_err());
        assert!(a.add(&b).is_err());
    }

    #[test]
    fn empty_id() {
        assert_eq!(Id::from_bytes([]), Err(Error::InvalidIdSize(0)));
        assert!(Id::try_from(Bytes::new()).is_err());
    }

    #[test]
    fn flip_bit_is_involution() {
        for _ in 0..20 {
            let a = Id::random(8);

            for i in 0..a.bits() {
                let flipped = a.flip_bit(i);

                assert_ne!(flipped, a);
                assert_eq!(flipped.bit(i), a.bit(i) ^ 1);
                assert_eq!(flipped.flip_bit(i), a);
            }
        }
    }

    #[test]
    fn flip_bit_does_not_mutate() {
        let a = id(&[0, 0]);
        let _ = a.flip_bit(3);

        assert_eq!(a, id(&[0, 0]));
        assert_eq!(a.flip_bit(0), id(&[128, 0]));
        assert_eq!(a.flip_bit(15), id(&[0, 1]));
    }

    #[test]
    fn leading_zeros_is_shared_prefix() {
        let a = id(&[0b1010_0000, 0]);
        let b = id(&[0b1011_0000, 0]);

        assert_eq!(a.xor(&b).unwrap().leading_zeros(), 3);

        let c = id(&[0, 1]);
        assert_eq!(c.leading_zeros(), 15);

        for _ in 0..100 {
            let a = Id::random(4);
            let b = Id::random(4);
            let shared = a.xor(&b).unwrap().leading_zeros() as usize;

            for i in 0..shared {
                assert_eq!(a.bit(i), b.bit(i));
            }
            if shared < a.bits() {
                assert_ne!(a.bit(shared), b.bit(shared));
            }
        }
    }

    #[test]
    fn add_carries() {
        assert_eq!(id(&[0, 255]).add(&id(&[0, 1])).unwrap(), id(&[1, 0]));
        assert_eq!(id(&[1, 10, 15]).add(&id(&[0, 0, 1])).unwrap(), id(&[1, 10, 16]));
        assert_eq!(id(&[255, 255]).add(&id(&[0, 1])).unwrap(), id(&[0, 0]));
    }

    #[test]
    fn compare_is_big_endian() {
        assert_eq!(id(&[1, 0]).compare(&id(&[0, 255])).unwrap(), Ordering::Greater);
        assert_eq!(id(&[0, 1]).compare(&id(&[0, 2])).unwrap(), Ordering::Less);
    }

    #[test]
    fn distance_cmp() {
        let target = id(&[192, 111, 222]);
        let a = id(&[128, 111, 222]);
        let b = id(&[64, 111, 222]);

        assert!(target.is_closer(&a, &b));
        assert!(!target.is_closer(&b, &a));
        assert_eq!(target.distance_cmp(&a, &a), Ordering::Equal);
        assert_eq!(
            target.distance_cmp(&a, &b),
            target.distance(&a).cmp(&target.distance(&b))
        );
    }

    #[test]
    fn display() {
        assert_eq!(id(&[1, 10, 255]).to_string(), "010aff");
        assert_eq!(format!("{:?}", id(&[1, 10, 255])), "Id(010aff)");
    }
}
