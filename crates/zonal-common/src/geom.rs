//! Minimum bounding rectangles.
//!
//! An [`Mbr`] is a d-dimensional axis-aligned box stored as `2 * d`
//! coordinates in `[lo_1, .., lo_d, hi_1, .., hi_d]` order, matching the
//! on-disk key layout. Boxes are closed: a zero-area point is a legal MBR
//! and overlap tests use `<=` / `>=`.

/// A d-dimensional axis-aligned minimum bounding rectangle.
#[derive(Debug, Clone, PartialEq)]
pub struct Mbr {
    coords: Vec<f64>,
}

impl Mbr {
    /// Creates an MBR from coordinates in lo..hi order.
    ///
    /// The slice length must be even (one lo and one hi per dimension)
    /// and every `lo_i <= hi_i`.
    pub fn new(coords: Vec<f64>) -> Self {
        debug_assert!(coords.len() >= 2 && coords.len() % 2 == 0);
        let d = coords.len() / 2;
        debug_assert!((0..d).all(|i| coords[i] <= coords[d + i]));
        Self { coords }
    }

    /// Creates an MBR from separate lo and hi corners.
    pub fn from_corners(lo: &[f64], hi: &[f64]) -> Self {
        debug_assert_eq!(lo.len(), hi.len());
        let mut coords = Vec::with_capacity(lo.len() * 2);
        coords.extend_from_slice(lo);
        coords.extend_from_slice(hi);
        Self::new(coords)
    }

    /// Number of spatial dimensions.
    pub fn dimensions(&self) -> u64 {
        (self.coords.len() / 2) as u64
    }

    /// All coordinates in lo..hi order.
    pub fn as_slice(&self) -> &[f64] {
        &self.coords
    }

    /// Lower bound in dimension `i`.
    pub fn lo(&self, i: usize) -> f64 {
        self.coords[i]
    }

    /// Upper bound in dimension `i`.
    pub fn hi(&self, i: usize) -> f64 {
        self.coords[self.coords.len() / 2 + i]
    }

    /// Volume of the box (product of side lengths).
    pub fn area(&self) -> f64 {
        let d = self.coords.len() / 2;
        (0..d).map(|i| self.hi(i) - self.lo(i)).product()
    }

    /// Smallest box covering both `self` and `other`.
    pub fn union(&self, other: &Mbr) -> Mbr {
        let mut merged = self.clone();
        merged.expand(other);
        merged
    }

    /// Grows `self` in place to cover `other`.
    pub fn expand(&mut self, other: &Mbr) {
        debug_assert_eq!(self.dimensions(), other.dimensions());
        let d = self.coords.len() / 2;
        for i in 0..d {
            self.coords[i] = self.coords[i].min(other.coords[i]);
            self.coords[d + i] = self.coords[d + i].max(other.coords[d + i]);
        }
    }

    /// True if the closed boxes share at least one point.
    pub fn overlaps(&self, other: &Mbr) -> bool {
        debug_assert_eq!(self.dimensions(), other.dimensions());
        let d = self.coords.len() / 2;
        (0..d).all(|i| self.lo(i) <= other.hi(i) && self.hi(i) >= other.lo(i))
    }

    /// True if `self` covers `other` componentwise (`self` ⊇ `other`).
    pub fn covers(&self, other: &Mbr) -> bool {
        debug_assert_eq!(self.dimensions(), other.dimensions());
        let d = self.coords.len() / 2;
        (0..d).all(|i| self.lo(i) <= other.lo(i) && self.hi(i) >= other.hi(i))
    }

    /// True if `self` covers `other` with strict inequality in every bound.
    pub fn covers_strictly(&self, other: &Mbr) -> bool {
        debug_assert_eq!(self.dimensions(), other.dimensions());
        let d = self.coords.len() / 2;
        (0..d).all(|i| self.lo(i) < other.lo(i) && self.hi(i) > other.hi(i))
    }

    /// Serialized size in bytes for `dimensions` dimensions.
    pub fn encoded_len(dimensions: u64) -> usize {
        dimensions as usize * 2 * std::mem::size_of::<f64>()
    }

    /// Writes the coordinates as little-endian f64 into `buf`.
    pub fn encode_into(&self, buf: &mut [u8]) {
        debug_assert_eq!(buf.len(), self.coords.len() * 8);
        for (i, c) in self.coords.iter().enumerate() {
            buf[i * 8..(i + 1) * 8].copy_from_slice(&c.to_le_bytes());
        }
    }

    /// Reads a `dimensions`-dimensional MBR from little-endian f64 bytes.
    pub fn decode(buf: &[u8], dimensions: u64) -> Mbr {
        let n = dimensions as usize * 2;
        debug_assert!(buf.len() >= n * 8);
        let mut coords = Vec::with_capacity(n);
        for i in 0..n {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&buf[i * 8..(i + 1) * 8]);
            coords.push(f64::from_le_bytes(raw));
        }
        Mbr { coords }
    }
}
