use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::ExtratoError;

/// One row of a statement export before validation.
#[derive(Debug, Clone, Default)]
pub struct RawRow {
    pub line: usize,
    pub date: String,
    pub description: String,
    pub amount: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    pub date: NaiveDate,
    pub description: String,
    pub amount: Decimal,
    pub source: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    Receita,
    Transporte,
    Delivery,
    Lazer,
    Saude,
    Farmacia,
    Moradia,
    Supermercado,
    Roupa,
    Educacao,
    Beleza,
    Assinaturas,
    Presentes,
    Outros,
}

impl Category {
    pub const ALL: &'static [Category] = &[
        Self::Receita,
        Self::Transporte,
        Self::Delivery,
        Self::Lazer,
        Self::Saude,
        Self::Farmacia,
        Self::Moradia,
        Self::Supermercado,
        Self::Roupa,
        Self::Educacao,
        Self::Beleza,
        Self::Assinaturas,
        Self::Presentes,
        Self::Outros,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Receita => "Receita",
            Self::Transporte => "Transporte",
            Self::Delivery => "Delivery",
            Self::Lazer => "Lazer",
            Self::Saude => "Saúde",
            Self::Farmacia => "Farmácia",
            Self::Moradia => "Moradia",
            Self::Supermercado => "Supermercado",
            Self::Roupa => "Roupa",
            Self::Educacao => "Educação",
            Self::Beleza => "Beleza",
            Self::Assinaturas => "Assinaturas",
            Self::Presentes => "Presentes",
            Self::Outros => "Outros",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Category {
    type Err = ExtratoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = fold(s.trim());
        Self::ALL
            .iter()
            .find(|c| fold(c.label()) == wanted)
            .copied()
            .ok_or_else(|| ExtratoError::UnknownCategory(s.to_string()))
    }
}

impl Serialize for Category {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

impl<'de> Deserialize<'de> for Category {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentMethod {
    Pix,
    Cartao,
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pix => "Pix",
            Self::Cartao => "Cartão",
        })
    }
}

/// Hex-encoded SHA-256 identity of a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(pub String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CategorizedTransaction {
    pub transaction: Transaction,
    pub category: Category,
    pub payment_method: PaymentMethod,
    pub fingerprint: Fingerprint,
}

/// Destination table inside the monthly worksheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Region {
    Entradas,
    GastosFixos,
    GastosVariaveis,
}

impl Region {
    pub const ALL: [Region; 3] = [Self::Entradas, Self::GastosFixos, Self::GastosVariaveis];
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Entradas => "Entradas",
            Self::GastosFixos => "Gastos Fixos",
            Self::GastosVariaveis => "Gastos Variáveis",
        })
    }
}

/// Lowercase and strip the Portuguese diacritics bank exports mix freely.
pub fn fold(s: &str) -> String {
    s.chars()
        .flat_map(char::to_lowercase)
        .map(|c| match c {
            'á' | 'à' | 'â' | 'ã' | 'ä' => 'a',
            'é' | 'è' | 'ê' | 'ë' => 'e',
            'í' | 'ì' | 'î' | 'ï' => 'i',
            'ó' | 'ò' | 'ô' | 'õ' | 'ö' => 'o',
            'ú' | 'ù' | 'û' | 'ü' => 'u',
            'ç' => 'c',
            'ñ' => 'n',
            other => other,
        })
        .collect()
}
