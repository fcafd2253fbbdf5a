use std::fmt;

/// Instruction opcodes; the id occupies the low six bits of the packed opcode byte.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Opcode {
    Noop = 0,
    In = 1,
    Inhook = 2,
    Releasehook = 3,
    Out = 4,
    Outhook = 5,
    Stitch = 6,
    Rack = 7,
    Knit = 8,
    Tuck = 9,
    Split = 10,
    Drop = 11,
    Amiss = 12,
    Xfer = 13,
    Miss = 14,
    Pause = 15,
    XStitchNumber = 16,
    XSpeedNumber = 17,
    XPresserMode = 18,
}

impl Opcode {
    pub const ALL: [Opcode; 19] = [
        Self::Noop,
        Self::In,
        Self::Inhook,
        Self::Releasehook,
        Self::Out,
        Self::Outhook,
        Self::Stitch,
        Self::Rack,
        Self::Knit,
        Self::Tuck,
        Self::Split,
        Self::Drop,
        Self::Amiss,
        Self::Xfer,
        Self::Miss,
        Self::Pause,
        Self::XStitchNumber,
        Self::XSpeedNumber,
        Self::XPresserMode,
    ];

    pub fn from_id(id: u8) -> Option<Self> {
        Self::ALL.get(usize::from(id)).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Noop => "noop",
            Self::In => "in",
            Self::Inhook => "inhook",
            Self::Releasehook => "releasehook",
            Self::Out => "out",
            Self::Outhook => "outhook",
            Self::Stitch => "stitch",
            Self::Rack => "rack",
            Self::Knit => "knit",
            Self::Tuck => "tuck",
            Self::Split => "split",
            Self::Drop => "drop",
            Self::Amiss => "amiss",
            Self::Xfer => "xfer",
            Self::Miss => "miss",
            Self::Pause => "pause",
            Self::XStitchNumber => "x-stitch-number",
            Self::XSpeedNumber => "x-speed-number",
            Self::XPresserMode => "x-presser-mode",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|op| op.name() == name)
    }

    /// Whether the textual form carries a direction token.
    pub fn has_direction(self) -> bool {
        matches!(self, Self::Knit | Self::Tuck | Self::Split | Self::Miss)
    }

    /// Whether this opcode forms loops with yarn on a needle.
    pub fn uses_yarn(self) -> bool {
        matches!(self, Self::Knit | Self::Tuck | Self::Split | Self::Miss)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Carriage direction, folded into the high bits of the packed opcode byte.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
pub enum Direction {
    Left = -1,
    #[default]
    None = 0,
    Right = 1,
}

impl Direction {
    const RIGHT_BIT: u8 = 0x40;
    const LEFT_BIT: u8 = 0x80;
    pub(crate) const MASK: u8 = 0xC0;

    pub(crate) fn bits(self) -> u8 {
        match self {
            Self::Left => Self::LEFT_BIT,
            Self::None => 0,
            Self::Right => Self::RIGHT_BIT,
        }
    }

    pub(crate) fn from_bits(bits: u8) -> Self {
        match bits & Self::MASK {
            Self::RIGHT_BIT => Self::Right,
            Self::LEFT_BIT => Self::Left,
            _ => Self::None,
        }
    }

    pub fn reverse(self) -> Self {
        match self {
            Self::Left => Self::Right,
            Self::None => Self::None,
            Self::Right => Self::Left,
        }
    }

    pub fn sign(self) -> i32 {
        self as i32
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Self::Left => "-",
            Self::None => "",
            Self::Right => "+",
        }
    }
}

/// Needle bed side, stored in the low two bits of a packed needle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub enum Side {
    Front = 0,
    Back = 1,
    FrontSlider = 2,
    BackSlider = 3,
}

impl Side {
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Front => "f",
            Self::Back => "b",
            Self::FrontSlider => "fs",
            Self::BackSlider => "bs",
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Self::Front => Self::Back,
            Self::Back => Self::Front,
            Self::FrontSlider => Self::BackSlider,
            Self::BackSlider => Self::FrontSlider,
        }
    }

    pub fn is_front(self) -> bool {
        matches!(self, Self::Front | Self::FrontSlider)
    }
}

/// A needle location: bed side plus signed offset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct Needle {
    pub side: Side,
    pub offset: i32,
}

impl Needle {
    pub fn new(side: Side, offset: i32) -> Self {
        Self { side, offset }
    }

    pub fn front(offset: i32) -> Self {
        Self::new(Side::Front, offset)
    }

    pub fn back(offset: i32) -> Self {
        Self::new(Side::Back, offset)
    }

    pub fn pack(self) -> u32 {
        ((self.offset << 2) | self.side as i32) as u32
    }

    pub fn unpack(raw: u32) -> Self {
        let side = match raw & 3 {
            0 => Side::Front,
            1 => Side::Back,
            2 => Side::FrontSlider,
            _ => Side::BackSlider,
        };
        Self {
            side,
            offset: (raw as i32) >> 2,
        }
    }

    pub fn parse(tok: &str) -> Option<Self> {
        let (side, rest) = if let Some(r) = tok.strip_prefix("fs") {
            (Side::FrontSlider, r)
        } else if let Some(r) = tok.strip_prefix("bs") {
            (Side::BackSlider, r)
        } else if let Some(r) = tok.strip_prefix('f') {
            (Side::Front, r)
        } else if let Some(r) = tok.strip_prefix('b') {
            (Side::Back, r)
        } else {
            return None;
        };
        let offset = rest.parse::<i32>().ok()?;
        // Offsets must survive the two-bit shift.
        if !(-(1 << 29)..(1 << 29)).contains(&offset) {
            return None;
        }
        Some(Self { side, offset })
    }
}

impl fmt::Display for Needle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.side.prefix(), self.offset)
    }
}

/// Presser foot mode for the `x-presser-mode` extension.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresserMode {
    Off = 0,
    On = 1,
    Auto = 2,
}

impl PresserMode {
    pub fn name(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::On => "on",
            Self::Auto => "auto",
        }
    }

    pub fn from_name(s: &str) -> Option<Self> {
        match s {
            "off" => Some(Self::Off),
            "on" => Some(Self::On),
            "auto" => Some(Self::Auto),
            _ => None,
        }
    }

    pub fn from_code(v: u32) -> Self {
        match v {
            1 => Self::On,
            2 => Self::Auto,
            _ => Self::Off,
        }
    }
}
