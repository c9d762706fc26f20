//! Benchmark kernel templates and loop orders.
//!
//! The measured program is a freestanding C matrix multiplication `C += A * B` where `A` is
//! `M x N`, `B` is `N x M` and `C` is `M x M`. The three nested loops are spelled as macros
//! (`I_LOOP`, `J_LOOP`, `K_LOOP`) so that any nesting order can be produced from a single
//! source without touching the loop body.

use crate::{config::RunConfig, error::SweepError};

use std::{fmt, str::FromStr};

/// One of the three loops of the matrix multiplication.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LoopRole {
    /// Rows of `A` and `C`, over `M`.
    I,
    /// Columns of `B` and `C`, over `M`.
    J,
    /// Accumulation dimension, over `N`.
    K,
}

impl LoopRole {
    pub const ALL: [LoopRole; 3] = [LoopRole::I, LoopRole::J, LoopRole::K];

    /// Name of the C macro expanding to this loop's header.
    pub fn macro_name(self) -> &'static str {
        match self {
            Self::I => "I_LOOP",
            Self::J => "J_LOOP",
            Self::K => "K_LOOP",
        }
    }

    fn letter(self) -> char {
        match self {
            Self::I => 'I',
            Self::J => 'J',
            Self::K => 'K',
        }
    }

    fn from_letter(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'I' => Some(Self::I),
            'J' => Some(Self::J),
            'K' => Some(Self::K),
            _ => None,
        }
    }
}

/// Nesting order of the three loops, outermost first.
///
/// Always a permutation of `I`, `J`, `K`: the only way to build one from outside this module
/// is through [`LoopOrder::all`] or parsing, both of which reject duplicates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LoopOrder([LoopRole; 3]);

impl LoopOrder {
    /// The textbook `IJK` order.
    pub const IJK: LoopOrder = LoopOrder([LoopRole::I, LoopRole::J, LoopRole::K]);

    /// The six permutations, outer loop varying slowest.
    pub fn all() -> Vec<LoopOrder> {
        let roles = LoopRole::ALL;
        let mut orders = Vec::with_capacity(6);
        for outer in 0..3 {
            for middle in (0..3).filter(|&m| m != outer) {
                let inner = 3 - outer - middle;
                orders.push(LoopOrder([roles[outer], roles[middle], roles[inner]]));
            }
        }
        orders
    }

    /// Loop roles, outermost first.
    pub fn roles(&self) -> [LoopRole; 3] {
        self.0
    }

    /// Parses a comma-separated list of order names, or `ALL` for every permutation.
    pub fn parse_list(s: &str) -> Result<Vec<LoopOrder>, SweepError> {
        if s.trim().eq_ignore_ascii_case("all") {
            return Ok(Self::all());
        }
        let mut orders: Vec<LoopOrder> = Vec::new();
        for name in s.split(',').map(str::trim).filter(|n| !n.is_empty()) {
            let order: LoopOrder = name.parse()?;
            if !orders.contains(&order) {
                orders.push(order);
            }
        }
        if orders.is_empty() {
            return Err(SweepError::InvalidOrder(s.to_string()));
        }
        Ok(orders)
    }
}

impl Default for LoopOrder {
    fn default() -> Self {
        Self::IJK
    }
}

impl fmt::Display for LoopOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for role in self.0 {
            write!(f, "{}", role.letter())?;
        }
        Ok(())
    }
}

impl FromStr for LoopOrder {
    type Err = SweepError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || SweepError::InvalidOrder(s.to_string());

        let roles = s
            .chars()
            .map(LoopRole::from_letter)
            .collect::<Option<Vec<_>>>()
            .ok_or_else(invalid)?;
        let roles: [LoopRole; 3] = roles.try_into().map_err(|_| invalid())?;

        if roles[0] == roles[1] || roles[0] == roles[2] || roles[1] == roles[2] {
            return Err(invalid());
        }
        Ok(Self(roles))
    }
}

/// Represents a kernel source template.
///
/// Placeholders are written `@NAME@` and sit behind `#ifndef` guards in the source, so the
/// rendered text compiles on its own and command-line `-D` defines still take precedence.
pub struct KernelTemplate {
    kernel_name: &'static str,
    kernel_source: &'static str,
}

impl KernelTemplate {
    pub const fn new(kernel_name: &'static str, kernel_source: &'static str) -> Self {
        Self {
            kernel_name,
            kernel_source,
        }
    }

    pub fn name(&self) -> &'static str {
        self.kernel_name
    }

    /// Substitutes the run configuration into the template.
    ///
    /// No validation happens here: `config.elem_type` is pasted verbatim and the loop order is
    /// assumed to be a permutation, which [`LoopOrder`] guarantees.
    pub fn render(&self, config: &RunConfig) -> String {
        let [l0, l1, l2] = config.order.roles();
        self.kernel_source
            .replace("@TYPE@", &config.elem_type)
            .replace("@M@", &config.m.to_string())
            .replace("@N@", &config.n.to_string())
            .replace("@LOOP0@", l0.macro_name())
            .replace("@LOOP1@", l1.macro_name())
            .replace("@LOOP2@", l2.macro_name())
    }
}

/// Freestanding matrix multiplication with configurable loop nesting.
pub static MATMUL: KernelTemplate =
    KernelTemplate::new("matmul", include_str!("../kernels/matmul.c"));
