use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{ExtratoError, Result};
use crate::models::{fold, Category, PaymentMethod, Transaction};

// ---------------------------------------------------------------------------
// Predicates
// ---------------------------------------------------------------------------

pub trait Predicate: fmt::Debug {
    fn matches(&self, description: &str) -> bool;
}

/// Case- and accent-insensitive substring.
#[derive(Debug)]
pub struct Keyword(String);

impl Keyword {
    pub fn new(keyword: &str) -> Self {
        Self(fold(keyword))
    }
}

impl Predicate for Keyword {
    fn matches(&self, description: &str) -> bool {
        fold(description).contains(&self.0)
    }
}

#[derive(Debug)]
pub struct Prefix(String);

impl Prefix {
    pub fn new(prefix: &str) -> Self {
        Self(fold(prefix))
    }
}

impl Predicate for Prefix {
    fn matches(&self, description: &str) -> bool {
        fold(description.trim_start()).starts_with(&self.0)
    }
}

#[derive(Debug)]
pub struct Pattern(Regex);

impl Pattern {
    pub fn new(pattern: &str) -> Result<Self> {
        Regex::new(pattern)
            .map(Self)
            .map_err(|e| ExtratoError::InvalidRule {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            })
    }
}

impl Predicate for Pattern {
    fn matches(&self, description: &str) -> bool {
        self.0.is_match(description)
    }
}

// ---------------------------------------------------------------------------
// Rule configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    #[default]
    Contains,
    StartsWith,
    Regex,
}

impl fmt::Display for MatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Contains => "contains",
            Self::StartsWith => "starts_with",
            Self::Regex => "regex",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleConfig {
    pub pattern: String,
    pub category: Category,
    #[serde(default)]
    pub match_type: MatchType,
}

impl RuleConfig {
    pub fn contains(pattern: &str, category: Category) -> Self {
        Self {
            pattern: pattern.to_string(),
            category,
            match_type: MatchType::Contains,
        }
    }
}

#[derive(Debug)]
pub struct CategoryRule {
    pub config: RuleConfig,
    predicate: Box<dyn Predicate>,
}

impl CategoryRule {
    pub fn from_config(config: &RuleConfig) -> Result<Self> {
        if config.pattern.trim().is_empty() {
            return Err(ExtratoError::InvalidRule {
                pattern: config.pattern.clone(),
                reason: "empty pattern matches everything".to_string(),
            });
        }
        let predicate: Box<dyn Predicate> = match config.match_type {
            MatchType::Contains => Box::new(Keyword::new(&config.pattern)),
            MatchType::StartsWith => Box::new(Prefix::new(&config.pattern)),
            MatchType::Regex => Box::new(Pattern::new(&config.pattern)?),
        };
        Ok(Self {
            config: config.clone(),
            predicate,
        })
    }

    pub fn category(&self) -> Category {
        self.config.category
    }

    pub fn matches(&self, description: &str) -> bool {
        self.predicate.matches(description)
    }
}

// ---------------------------------------------------------------------------
// RuleSet
// ---------------------------------------------------------------------------

/// Ordered rules; the first match wins.
#[derive(Debug)]
pub struct RuleSet {
    rules: Vec<CategoryRule>,
    default: Category,
}

impl RuleSet {
    pub fn new(rules: Vec<CategoryRule>, default: Category) -> Self {
        Self { rules, default }
    }

    pub fn from_config(configs: &[RuleConfig], default: Category) -> Result<Self> {
        let rules = configs
            .iter()
            .map(CategoryRule::from_config)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(rules, default))
    }

    pub fn rules(&self) -> &[CategoryRule] {
        &self.rules
    }

    pub fn default_category(&self) -> Category {
        self.default
    }

    pub fn classify_description(&self, description: &str) -> Category {
        if description.trim().is_empty() {
            return self.default;
        }
        self.rules
            .iter()
            .find(|rule| rule.matches(description))
            .map(CategoryRule::category)
            .unwrap_or(self.default)
    }

    pub fn classify(&self, txn: &Transaction) -> Category {
        self.classify_description(&txn.description)
    }
}

pub fn detect_payment_method(description: &str) -> PaymentMethod {
    let desc = fold(description);
    if desc.contains("pix") {
        PaymentMethod::Pix
    } else if desc.contains("cartao") || desc.contains("credito") {
        PaymentMethod::Cartao
    } else {
        PaymentMethod::Pix
    }
}

/// Keyword rules shipped with a fresh settings file.
pub fn default_rules() -> Vec<RuleConfig> {
    use Category::*;
    let groups: &[(Category, &[&str])] = &[
        (Receita, &["recebida", "salario"]),
        (Delivery, &["ifood", "rappi", "uber eats", "delivery"]),
        (Transporte, &[
            "uber", "99", "taxi", "gasolina", "posto", "ipva", "estacionamento", "onibus", "metro",
        ]),
        (Assinaturas, &["netflix", "spotify", "prime", "disney"]),
        (Lazer, &["cinema", "restaurante", "bar", "show"]),
        (Saude, &["medico", "hospital", "laboratorio", "consulta", "exame", "clinica"]),
        (Farmacia, &["farmacia", "drogaria", "droga", "remedio"]),
        (Moradia, &["aluguel", "condominio", "luz", "agua", "internet", "gas", "energia"]),
        (Supermercado, &[
            "supermercado", "mercado", "atacadao", "pao de acucar", "assai", "padaria",
        ]),
        (Roupa, &["roupa", "sapato", "loja", "zara", "renner", "nike", "adidas"]),
        (Educacao, &["faculdade", "universidade", "curso", "mensalidade", "escola"]),
        (Beleza, &["salao", "cabelo", "manicure", "barbeiro", "estetica"]),
        (Assinaturas, &[
            "assinatura", "recorrente", "plano", "academia", "tim", "vivo", "claro", "oi",
        ]),
        (Presentes, &["presente", "gift"]),
    ];
    groups
        .iter()
        .flat_map(|(cat, words)| words.iter().map(move |w| RuleConfig::contains(w, *cat)))
        .collect()
}
