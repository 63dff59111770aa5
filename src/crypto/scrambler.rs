use super::Key;

/// Derives a normal key from a KeyX/KeyY pair using the 3DS key scrambler.
///
/// `KeyNormal = (((KeyX <<< 2) ^ KeyY) + C) <<< 87`, with all values treated
/// as 128-bit big-endian integers.
pub fn ctr_scramble(key_x: &Key, key_y: &Key, constant: &Key) -> Key {
    let x = u128::from_be_bytes(*key_x);
    let y = u128::from_be_bytes(*key_y);
    let c = u128::from_be_bytes(*constant);

    let normal = ((x.rotate_left(2) ^ y).wrapping_add(c)).rotate_left(87);
    normal.to_be_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_inputs_give_rotated_constant() {
        let mut c = [0; 16];
        c[15] = 1;
        let normal = ctr_scramble(&[0; 16], &[0; 16], &c);
        assert_eq!(u128::from_be_bytes(normal), 1u128 << 87);
    }

    #[test]
    fn addition_carries_across_halves() {
        let x = [0; 16];
        let mut y = [0; 16];
        y[8..].copy_from_slice(&[0xFF; 8]);
        let mut c = [0; 16];
        c[15] = 1;
        let normal = u128::from_be_bytes(ctr_scramble(&x, &y, &c));
        assert_eq!(normal.rotate_right(87), 1u128 << 64);
    }

    #[test]
    fn key_x_is_rotated_before_xor() {
        let mut x = [0; 16];
        x[0] = 0x80;
        let normal = u128::from_be_bytes(ctr_scramble(&x, &[0; 16], &[0; 16]));
        assert_eq!(normal.rotate_right(87), 0b10);
    }
}
