const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Renders a signed integer in base 36 with lowercase digits and a leading `-` for negative
///  values, i.e. the same text a JavaScript peer produces with `n.toString(36)`.
pub fn to_base36(value: i64) -> String {
    let mut magnitude = value.unsigned_abs();
    if magnitude == 0 {
        return "0".to_string();
    }

    let mut digits = Vec::new();
    while magnitude > 0 {
        digits.push(DIGITS[(magnitude % 36) as usize]);
        magnitude /= 36;
    }
    if value < 0 {
        digits.push(b'-');
    }
    digits.reverse();

    digits.into_iter().map(char::from).collect()
}

pub fn try_from_base36(s: &str) -> anyhow::Result<i64> {
    Ok(i64::from_str_radix(s, 36)?)
}
