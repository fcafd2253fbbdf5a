use std::collections::HashMap;

use super::ExprError;
use super::parser::{BinaryOp, Expr, UnaryOp};
use crate::layers::StitchCode;

/// Variable bindings for one evaluation.
#[derive(Clone, Debug, Default)]
pub struct Env {
    vars: HashMap<&'static str, f64>,
}

impl Env {
    /// Environment pre-populated with the stitch program constants.
    pub fn new() -> Self {
        let mut env = Self::default();
        for code in StitchCode::ALL {
            env.vars.insert(code.name(), f64::from(code as u8));
        }
        env
    }

    pub fn set(&mut self, name: &'static str, value: f64) {
        self.vars.insert(name, value);
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.vars.get(name).copied()
    }
}

fn truth(v: f64) -> bool {
    v != 0.0 && !v.is_nan()
}

fn flag(b: bool) -> f64 {
    if b { 1.0 } else { 0.0 }
}

/// Evaluate to a number; comparisons and logic yield `1` or `0`.
pub fn eval(expr: &Expr, env: &Env) -> Result<f64, ExprError> {
    match expr {
        Expr::Num(v) => Ok(*v),
        Expr::Var(name) => env
            .get(name)
            .ok_or_else(|| ExprError::new(0, format!("unknown variable '{name}'"))),
        Expr::Unary(op, e) => {
            let v = eval(e, env)?;
            Ok(match op {
                UnaryOp::Neg => -v,
                UnaryOp::Not => flag(!truth(v)),
            })
        }
        Expr::Binary(BinaryOp::And, a, b) => {
            Ok(flag(truth(eval(a, env)?) && truth(eval(b, env)?)))
        }
        Expr::Binary(BinaryOp::Or, a, b) => {
            Ok(flag(truth(eval(a, env)?) || truth(eval(b, env)?)))
        }
        Expr::Binary(op, a, b) => {
            let (x, y) = (eval(a, env)?, eval(b, env)?);
            Ok(match op {
                BinaryOp::Add => x + y,
                BinaryOp::Sub => x - y,
                BinaryOp::Mul => x * y,
                BinaryOp::Div => x / y,
                BinaryOp::Mod => x.rem_euclid(y),
                BinaryOp::Pow => x.powf(y),
                BinaryOp::Eq => flag((x - y).abs() < 1e-9),
                BinaryOp::Ne => flag((x - y).abs() >= 1e-9),
                BinaryOp::Lt => flag(x < y),
                BinaryOp::Le => flag(x <= y),
                BinaryOp::Gt => flag(x > y),
                BinaryOp::Ge => flag(x >= y),
                BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
            })
        }
        Expr::Cond(c, yes, no) => {
            if truth(eval(c, env)?) {
                eval(yes, env)
            } else {
                eval(no, env)
            }
        }
        Expr::Call(func, args) => call(func, args, env),
    }
}

fn call(func: &str, args: &[Expr], env: &Env) -> Result<f64, ExprError> {
    let vals = args
        .iter()
        .map(|a| eval(a, env))
        .collect::<Result<Vec<_>, _>>()?;
    let arity = |n: usize| {
        if vals.len() == n {
            Ok(())
        } else {
            Err(ExprError::new(
                0,
                format!("{func}() takes {n} argument(s), got {}", vals.len()),
            ))
        }
    };
    match func {
        "abs" => arity(1).map(|_| vals[0].abs()),
        "floor" => arity(1).map(|_| vals[0].floor()),
        "ceil" => arity(1).map(|_| vals[0].ceil()),
        "round" => arity(1).map(|_| vals[0].round()),
        "sqrt" => arity(1).map(|_| vals[0].sqrt()),
        "sin" => arity(1).map(|_| vals[0].sin()),
        "cos" => arity(1).map(|_| vals[0].cos()),
        "min" | "max" if vals.is_empty() => {
            Err(ExprError::new(0, format!("{func}() needs arguments")))
        }
        "min" => Ok(vals.iter().copied().fold(f64::INFINITY, f64::min)),
        "max" => Ok(vals.iter().copied().fold(f64::NEG_INFINITY, f64::max)),
        _ => Err(ExprError::new(0, format!("unknown function '{func}'"))),
    }
}
