/// Applies (or removes) the RFC 6455 XOR mask in place.
pub(crate) fn mask(payload: &mut [u8], mask_key: [u8; 4]) {
    let mut words = payload.chunks_exact_mut(4);
    for word in &mut words {
        for (b, k) in word.iter_mut().zip(mask_key) {
            *b ^= k;
        }
    }
    // tail < 4 bytes
    for (b, k) in words.into_remainder().iter_mut().zip(mask_key) {
        *b ^= k;
    }
}
