//! Hardware containers: fixed-width registers the PHV is carved into.

use std::fmt;

/// Container kind. Kinds differ in what ALU operations they admit:
/// normal containers accept arbitrary per-bit writes, mocha and dark
/// containers only whole-container writes, and tagalong containers carry
/// data past the MAU with no ALU access at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ContainerKind {
    Normal,
    Mocha,
    Dark,
    Tagalong,
}

/// Container width in bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ContainerSize {
    B8,
    B16,
    B32,
}

impl ContainerSize {
    pub fn bits(&self) -> u16 {
        match self {
            ContainerSize::B8 => 8,
            ContainerSize::B16 => 16,
            ContainerSize::B32 => 32,
        }
    }
}

/// One physical PHV register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Container {
    pub kind: ContainerKind,
    pub size: ContainerSize,
    pub index: u16,
}

impl Container {
    pub fn new(kind: ContainerKind, size: ContainerSize, index: u16) -> Self {
        Self { kind, size, index }
    }

    pub fn bits(&self) -> u16 {
        self.size.bits()
    }

    /// Mocha and dark containers admit only whole-container writes: an
    /// action writing any bit of the container must write all of them.
    pub fn whole_container_writes_only(&self) -> bool {
        matches!(self.kind, ContainerKind::Mocha | ContainerKind::Dark)
    }

    /// Tagalong containers never pass through an ALU, so action
    /// constraints do not apply to them.
    pub fn accepts_alu(&self) -> bool {
        self.kind != ContainerKind::Tagalong
    }

    pub fn is_dark(&self) -> bool {
        self.kind == ContainerKind::Dark
    }
}

impl fmt::Display for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            ContainerKind::Normal => "",
            ContainerKind::Mocha => "M",
            ContainerKind::Dark => "D",
            ContainerKind::Tagalong => "T",
        };
        let size = match self.size {
            ContainerSize::B8 => "B",
            ContainerSize::B16 => "H",
            ContainerSize::B32 => "W",
        };
        write!(f, "{kind}{size}{}", self.index)
    }
}
