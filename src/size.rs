use std::fmt;
use std::str::FromStr;


quick_error! {
    #[derive(Debug, PartialEq)]
    pub enum SizeError {
        Empty {
            display("size is empty")
        }
        BadNumber(s: String) {
            display("invalid size number {:?}", s)
        }
        BadUnit(c: char) {
            display("invalid size unit {:?}", c)
        }
        Overflow {
            display("size overflows")
        }
    }
}

/// A byte count parsed from nginx-style `B`/`K`/`M`/`G` notation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Size(u64);

impl Size {
    pub fn from_bytes(bytes: u64) -> Size {
        Size(bytes)
    }
    pub fn from_kilobytes(kb: u64) -> Size {
        Size(kb << 10)
    }
    pub fn from_megabytes(mb: u64) -> Size {
        Size(mb << 20)
    }
    pub fn bytes(&self) -> u64 {
        self.0
    }
    pub fn min(self, other: Size) -> Size {
        if self.0 <= other.0 { self } else { other }
    }

    /// Parses `1024`, `8K`, `10m`, `1G` (unit is case-insensitive)
    pub fn parse(s: &str) -> Result<Size, SizeError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(SizeError::Empty);
        }
        let (digits, multiplier) = match s.chars().last().unwrap() {
            'b' | 'B' => (&s[..s.len()-1], 1),
            'k' | 'K' => (&s[..s.len()-1], 1 << 10),
            'm' | 'M' => (&s[..s.len()-1], 1 << 20),
            'g' | 'G' => (&s[..s.len()-1], 1 << 30),
            c if c.is_digit(10) => (s, 1),
            c => return Err(SizeError::BadUnit(c)),
        };
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(SizeError::BadNumber(digits.to_string()));
        }
        let value: u64 = digits.parse()
            .map_err(|_| SizeError::BadNumber(digits.to_string()))?;
        value.checked_mul(multiplier)
            .map(Size)
            .ok_or(SizeError::Overflow)
    }
}

impl FromStr for Size {
    type Err = SizeError;
    fn from_str(s: &str) -> Result<Size, SizeError> {
        Size::parse(s)
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
