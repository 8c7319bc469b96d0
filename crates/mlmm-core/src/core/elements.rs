use phf::{Map, phf_map};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Element {
    pub atomic_number: u8,
    pub symbol: &'static str,
    /// Standard atomic weight in amu.
    pub mass: f64,
}

static ELEMENTS: Map<u8, Element> = phf_map! {
    1u8 => Element { atomic_number: 1, symbol: "H", mass: 1.008 },
    3u8 => Element { atomic_number: 3, symbol: "Li", mass: 6.94 },
    5u8 => Element { atomic_number: 5, symbol: "B", mass: 10.81 },
    6u8 => Element { atomic_number: 6, symbol: "C", mass: 12.011 },
    7u8 => Element { atomic_number: 7, symbol: "N", mass: 14.007 },
    8u8 => Element { atomic_number: 8, symbol: "O", mass: 15.999 },
    9u8 => Element { atomic_number: 9, symbol: "F", mass: 18.998 },
    11u8 => Element { atomic_number: 11, symbol: "Na", mass: 22.990 },
    12u8 => Element { atomic_number: 12, symbol: "Mg", mass: 24.305 },
    15u8 => Element { atomic_number: 15, symbol: "P", mass: 30.974 },
    16u8 => Element { atomic_number: 16, symbol: "S", mass: 32.06 },
    17u8 => Element { atomic_number: 17, symbol: "Cl", mass: 35.45 },
    19u8 => Element { atomic_number: 19, symbol: "K", mass: 39.098 },
    20u8 => Element { atomic_number: 20, symbol: "Ca", mass: 40.078 },
    25u8 => Element { atomic_number: 25, symbol: "Mn", mass: 54.938 },
    26u8 => Element { atomic_number: 26, symbol: "Fe", mass: 55.845 },
    29u8 => Element { atomic_number: 29, symbol: "Cu", mass: 63.546 },
    30u8 => Element { atomic_number: 30, symbol: "Zn", mass: 65.38 },
    34u8 => Element { atomic_number: 34, symbol: "Se", mass: 78.971 },
    35u8 => Element { atomic_number: 35, symbol: "Br", mass: 79.904 },
    53u8 => Element { atomic_number: 53, symbol: "I", mass: 126.904 },
};

/// Looks up an element by atomic number.
pub fn by_atomic_number(atomic_number: u8) -> Option<&'static Element> {
    ELEMENTS.get(&atomic_number)
}

/// Guesses an element from an atomic mass, for topologies without atomic numbers.
///
/// Hydrogen is matched generously (up to 4.1 amu) so that hydrogen-mass-repartitioned
/// topologies are still recognised. Other elements must lie within 0.5 amu.
pub fn guess_from_mass(mass: f64) -> Option<&'static Element> {
    if mass > 0.5 && mass < 4.1 {
        return by_atomic_number(1);
    }
    ELEMENTS
        .values()
        .filter(|element| (element.mass - mass).abs() < 0.5)
        .min_by(|a, b| {
            (a.mass - mass)
                .abs()
                .partial_cmp(&(b.mass - mass).abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        })
}
