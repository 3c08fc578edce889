//! Deterministic facility colours
//!
//! A colour is a pure function of the facility id, so partitions rendered in
//! different runs, categories or ranks always agree.

use refuge_common::FacilityId;

/// Colour for edges whose node has no owner at the requested rank
pub const UNOWNED_COLOR: [u8; 3] = [0x88, 0x88, 0x88];

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// RGB colour of a facility (FNV-1a over the id, then a finalizer mix)
pub fn facility_color(id: FacilityId) -> [u8; 3] {
    let mut hash = FNV_OFFSET;
    for byte in id.0.to_le_bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    // splitmix64 finalizer spreads neighbouring ids across the colour space
    hash ^= hash >> 30;
    hash = hash.wrapping_mul(0xbf58_476d_1ce4_e5b9);
    hash ^= hash >> 27;
    hash = hash.wrapping_mul(0x94d0_49bb_1331_11eb);
    hash ^= hash >> 31;

    let [r, g, b, ..] = hash.to_le_bytes();
    [r, g, b]
}

/// `#rrggbb` form of [`facility_color`], or the unowned grey for `None`
pub fn hex_color(id: Option<FacilityId>) -> String {
    let [r, g, b] = id.map(facility_color).unwrap_or(UNOWNED_COLOR);
    format!("#{r:02x}{g:02x}{b:02x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn colors_are_stable_and_distinct() {
        assert_eq!(facility_color(FacilityId(7)), facility_color(FacilityId(7)));
        assert_ne!(facility_color(FacilityId(7)), facility_color(FacilityId(8)));
    }

    #[test]
    fn hex_format() {
        assert_eq!(hex_color(None), "#888888");
        let hex = hex_color(Some(FacilityId(3)));
        assert_eq!(hex.len(), 7);
        assert!(hex.starts_with('#'));
    }
}
