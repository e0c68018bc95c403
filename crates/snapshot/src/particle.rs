//! Particle type slots, the type filter, and the transient position record.

/// Number of particle type slots in a header.
pub const NUM_TYPES: usize = 6;

/// Particle type discriminator, in header slot order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[repr(u8)]
pub enum ParticleType {
    /// Gas (SPH) particles
    Gas = 0,
    /// Dark matter (halo) particles
    DarkMatter = 1,
    /// Disk particles
    Disk = 2,
    /// Bulge particles
    Bulge = 3,
    /// Star particles
    Star = 4,
    /// Boundary particles; black holes in most runs
    Boundary = 5,
}

impl ParticleType {
    /// All slots in the order they appear on disk.
    pub const ALL: [ParticleType; NUM_TYPES] = [
        ParticleType::Gas,
        ParticleType::DarkMatter,
        ParticleType::Disk,
        ParticleType::Bulge,
        ParticleType::Star,
        ParticleType::Boundary,
    ];

    /// Type for a header slot index, if in range.
    pub fn from_slot(slot: usize) -> Option<Self> {
        Self::ALL.get(slot).copied()
    }

    /// Header slot index of this type.
    pub fn slot(self) -> usize {
        self as usize
    }

    /// Gas, star and black-hole slots.
    pub fn is_baryon(self) -> bool {
        matches!(
            self,
            ParticleType::Gas | ParticleType::Star | ParticleType::Boundary
        )
    }
}

/// Which particle species count toward load balancing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
pub enum TypeFilter {
    /// Every particle
    #[default]
    All,
    /// Everything that is not gas, star or black hole
    DarkMatter,
    /// Star particles only
    Star,
    /// Gas particles only
    Gas,
}

impl TypeFilter {
    /// Whether particles in header slot `slot` pass the filter.
    pub fn accepts(self, slot: usize) -> bool {
        match ParticleType::from_slot(slot) {
            Some(ptype) => self.accepts_type(ptype),
            None => false,
        }
    }

    /// Whether particles of `ptype` pass the filter.
    pub fn accepts_type(self, ptype: ParticleType) -> bool {
        match self {
            TypeFilter::All => true,
            TypeFilter::DarkMatter => !ptype.is_baryon(),
            TypeFilter::Star => ptype == ParticleType::Star,
            TypeFilter::Gas => ptype == ParticleType::Gas,
        }
    }
}

/// A single decoded particle position. Never collected in bulk.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParticleRecord {
    /// Type slot the record was read from
    pub ptype: ParticleType,
    /// Position in snapshot length units
    pub position: [f64; 3],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_repr() {
        for (slot, ptype) in ParticleType::ALL.iter().enumerate() {
            assert_eq!(ptype.slot(), slot);
            assert_eq!(ParticleType::from_slot(slot), Some(*ptype));
        }
        assert_eq!(ParticleType::from_slot(6), None);
    }

    #[test]
    fn filter_table() {
        // rows: All, DarkMatter, Star, Gas; columns: slots 0..5
        let expected = [
            (TypeFilter::All, [true, true, true, true, true, true]),
            (TypeFilter::DarkMatter, [false, true, true, true, false, false]),
            (TypeFilter::Star, [false, false, false, false, true, false]),
            (TypeFilter::Gas, [true, false, false, false, false, false]),
        ];
        for (filter, row) in expected {
            for (slot, &want) in row.iter().enumerate() {
                assert_eq!(filter.accepts(slot), want, "{:?} slot {}", filter, slot);
            }
        }
    }

    #[test]
    fn out_of_range_slot_never_accepted() {
        assert!(!TypeFilter::All.accepts(NUM_TYPES));
    }

    #[test]
    fn dark_matter_and_baryons_partition_the_slots() {
        for ptype in ParticleType::ALL {
            assert_ne!(TypeFilter::DarkMatter.accepts_type(ptype), ptype.is_baryon());
        }
    }
}
