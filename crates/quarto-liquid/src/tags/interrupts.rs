/*
 * tags/interrupts.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! `break` and `continue`.

use crate::context::Context;
use crate::error::LiquidResult;
use crate::parser::{Parser, RenderOutcome, Tag, TokenStream};

#[derive(Debug)]
pub struct InterruptTag {
    outcome: RenderOutcome,
}

pub fn parse(
    name: &str,
    _markup: &str,
    _tokens: &mut TokenStream,
    _parser: &Parser,
) -> LiquidResult<Box<dyn Tag>> {
    let outcome = match name {
        "break" => RenderOutcome::Break,
        _ => RenderOutcome::Continue,
    };
    Ok(Box::new(InterruptTag { outcome }))
}

impl Tag for InterruptTag {
    fn name(&self) -> &str {
        match self.outcome {
            RenderOutcome::Break => "break",
            _ => "continue",
        }
    }

    fn render(&self, _ctx: &mut Context, _out: &mut String) -> LiquidResult<RenderOutcome> {
        Ok(self.outcome)
    }
}
