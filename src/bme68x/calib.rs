/// Factory-fused compensation coefficients.
///
/// Unique to every chip; read once during init.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CalibData {
    pub par_t1: u16,
    pub par_t2: i16,
    pub par_t3: i8,
    pub par_p1: u16,
    pub par_p2: i16,
    pub par_p3: i8,
    pub par_p4: i16,
    pub par_p5: i16,
    pub par_p6: i8,
    pub par_p7: i8,
    pub par_p8: i16,
    pub par_p9: i16,
    pub par_p10: u8,
    pub par_h1: u16,
    pub par_h2: u16,
    pub par_h3: i8,
    pub par_h4: i8,
    pub par_h5: i8,
    pub par_h6: u8,
    pub par_h7: i8,
    pub par_gh1: i8,
    pub par_gh2: i16,
    pub par_gh3: i8,
    pub res_heat_range: u8,
    pub res_heat_val: i8,
    pub range_sw_err: i8,
}

/// Start and length of the three calibration blocks, in read order.
pub(crate) const BLOCKS: [(u8, usize); 3] = [(0x8A, 23), (0xE1, 14), (0x00, 5)];
pub(crate) const LEN: usize = 23 + 14 + 5;

fn le_u16(lsb: u8, msb: u8) -> u16 {
    u16::from_le_bytes([lsb, msb])
}

fn le_i16(lsb: u8, msb: u8) -> i16 {
    i16::from_le_bytes([lsb, msb])
}

impl CalibData {
    /// Decodes the concatenated calibration blocks.
    pub fn parse(c: &[u8; LEN]) -> Self {
        Self {
            par_t1: le_u16(c[31], c[32]),
            par_t2: le_i16(c[0], c[1]),
            par_t3: c[2] as i8,
            par_p1: le_u16(c[4], c[5]),
            par_p2: le_i16(c[6], c[7]),
            par_p3: c[8] as i8,
            par_p4: le_i16(c[10], c[11]),
            par_p5: le_i16(c[12], c[13]),
            par_p6: c[15] as i8,
            par_p7: c[14] as i8,
            par_p8: le_i16(c[18], c[19]),
            par_p9: le_i16(c[20], c[21]),
            par_p10: c[22],
            // H1 and H2 share the nibbles of byte 24.
            par_h1: (u16::from(c[25]) << 4) | u16::from(c[24] & 0x0F),
            par_h2: (u16::from(c[23]) << 4) | u16::from(c[24] >> 4),
            par_h3: c[26] as i8,
            par_h4: c[27] as i8,
            par_h5: c[28] as i8,
            par_h6: c[29],
            par_h7: c[30] as i8,
            par_gh1: c[35] as i8,
            par_gh2: le_i16(c[33], c[34]),
            par_gh3: c[36] as i8,
            res_heat_val: c[37] as i8,
            res_heat_range: (c[39] & 0x30) >> 4,
            range_sw_err: (c[41] as i8) >> 4,
        }
    }
}
