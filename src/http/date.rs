use std::time::{SystemTime, UNIX_EPOCH};

/// Largest representable time, `Fri, 31 Dec 9999 23:59:59 GMT`.
const MAX_SECS: u64 = 253402300799;

const DAY_NAMES: [&[u8; 3]; 7] = [b"Sun", b"Mon", b"Tue", b"Wed", b"Thu", b"Fri", b"Sat"];
const MONTH_NAMES: [&[u8; 3]; 12] = [
    b"Jan", b"Feb", b"Mar", b"Apr", b"May", b"Jun", b"Jul", b"Aug", b"Sep", b"Oct", b"Nov", b"Dec",
];

/// Create [httpdate][rfc] for current time.
///
/// [rfc]: <https://datatracker.ietf.org/doc/html/rfc9110#section-5.6.7>
#[inline]
pub fn httpdate_now() -> [u8; 29] {
    httpdate(SystemTime::now())
}

/// Create [httpdate][rfc] with given time.
///
/// Times before the unix epoch are written as the epoch, times after year 9999 are clamped.
///
/// [rfc]: <https://datatracker.ietf.org/doc/html/rfc9110#section-5.6.7>
pub fn httpdate(time: SystemTime) -> [u8; 29] {
    let secs = time
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
        .min(MAX_SECS);

    let days = (secs / 86400) as i64;
    let secs_of_day = secs % 86400;
    let (year, month, day) = civil_from_days(days);

    let mut buf: [u8; 29] = *b"ddd, 00 mmm 0000 00:00:00 GMT";

    // 1970-01-01 is a thursday
    buf[..3].copy_from_slice(DAY_NAMES[((days + 4) % 7) as usize]);
    write_2digit(&mut buf[5..7], day as u64);
    buf[8..11].copy_from_slice(MONTH_NAMES[(month - 1) as usize]);
    write_2digit(&mut buf[12..14], year as u64 / 100);
    write_2digit(&mut buf[14..16], year as u64 % 100);
    write_2digit(&mut buf[17..19], secs_of_day / 3600);
    write_2digit(&mut buf[20..22], secs_of_day % 3600 / 60);
    write_2digit(&mut buf[23..25], secs_of_day % 60);

    buf
}

fn write_2digit(buf: &mut [u8], value: u64) {
    buf[0] = b'0' + (value / 10) as u8;
    buf[1] = b'0' + (value % 10) as u8;
}

/// Convert days since the unix epoch into `(year, month, day)`.
///
/// <https://howardhinnant.github.io/date_algorithms.html#civil_from_days>
fn civil_from_days(days: i64) -> (i64, i64, i64) {
    let z = days + 719468;
    let era = z.div_euclid(146097);
    let doe = z.rem_euclid(146097);
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = doy - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = yoe + era * 400 + (month <= 2) as i64;
    (year, month, day)
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, UNIX_EPOCH};
    use super::httpdate;

    #[test]
    fn test_httpdate() {
        let d = UNIX_EPOCH;
        assert_eq!(str::from_utf8(&httpdate(d)), Ok("Thu, 01 Jan 1970 00:00:00 GMT"));
        let d = UNIX_EPOCH + Duration::from_secs(1475419451);
        assert_eq!(str::from_utf8(&httpdate(d)), Ok("Sun, 02 Oct 2016 14:44:11 GMT"));
        let d = UNIX_EPOCH + Duration::from_secs(951782400);
        assert_eq!(str::from_utf8(&httpdate(d)), Ok("Tue, 29 Feb 2000 00:00:00 GMT"));
    }
}
