//! Text values for generated rows.

use ::fake::faker::address::en::CityName;
use ::fake::faker::company::en::CompanyName;
use ::fake::faker::internet::en::SafeEmail;
use ::fake::faker::name::en::Name;
use ::fake::Fake;
use rand::Rng;

/// Flavour of text column, picked from the column name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextKind {
    Name,
    Email,
    Company,
    City,
}

impl TextKind {
    pub const ALL: [TextKind; 4] = [
        TextKind::Name,
        TextKind::Email,
        TextKind::Company,
        TextKind::City,
    ];

    pub fn column_name(self) -> &'static str {
        match self {
            TextKind::Name => "name",
            TextKind::Email => "email",
            TextKind::Company => "company",
            TextKind::City => "city",
        }
    }
}

pub fn text<R: Rng + ?Sized>(kind: TextKind, rng: &mut R) -> String {
    match kind {
        TextKind::Name => Name().fake_with_rng(rng),
        TextKind::Email => SafeEmail().fake_with_rng(rng),
        TextKind::Company => CompanyName().fake_with_rng(rng),
        TextKind::City => CityName().fake_with_rng(rng),
    }
}
