// Composite formula parser and column-wise evaluator
// Supports: numbers, indicator names, basic math (+, -, *, /), parentheses,
// functions ZSCORE, ABS, MIN, MAX

/// Parsed composite calculation.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    /// Reference to an earlier indicator by name.
    Indicator(String),
    Function {
        func: Function,
        args: Vec<Expr>,
    },
    BinaryOp {
        op: Op,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    /// Standard score over all units (sample standard deviation).
    ZScore,
    Abs,
    Min,
    Max,
}

impl Function {
    fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "ZSCORE" => Some(Self::ZScore),
            "ABS" => Some(Self::Abs),
            "MIN" => Some(Self::Min),
            "MAX" => Some(Self::Max),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::ZScore => "ZSCORE",
            Self::Abs => "ABS",
            Self::Min => "MIN",
            Self::Max => "MAX",
        }
    }

    fn check_arity(self, count: usize) -> Result<(), String> {
        let ok = match self {
            Self::ZScore | Self::Abs => count == 1,
            Self::Min | Self::Max => count >= 1,
        };
        if ok {
            Ok(())
        } else {
            Err(format!("{} does not take {count} argument(s)", self.name()))
        }
    }
}

/// Parse a calculation such as `100 - PCT_NO_CAR` or `zscore(PCT_UNEMP)`.
pub fn parse(formula: &str) -> Result<Expr, String> {
    let tokens = tokenize(formula.trim())?;
    if tokens.is_empty() {
        return Err("Empty formula".to_string());
    }
    let (expr, pos) = parse_add_sub(&tokens, 0)?;
    if pos < tokens.len() {
        return Err(format!("Unexpected token at position {pos}"));
    }
    Ok(expr)
}

/// Indicator names referenced by `expr`, in first-use order without repeats.
pub fn referenced_indicators(expr: &Expr) -> Vec<String> {
    let mut names = Vec::new();
    collect_indicators(expr, &mut names);
    names
}

fn collect_indicators(expr: &Expr, names: &mut Vec<String>) {
    match expr {
        Expr::Number(_) => {}
        Expr::Indicator(name) => {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
        Expr::Function { args, .. } => {
            for arg in args {
                collect_indicators(arg, names);
            }
        }
        Expr::BinaryOp { left, right, .. } => {
            collect_indicators(left, names);
            collect_indicators(right, names);
        }
    }
}

// =============================================================================
// Tokenizer
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
    Comma,
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' | '\n' | '\r' => { chars.next(); }
            '+' => { tokens.push(Token::Plus); chars.next(); }
            '-' => { tokens.push(Token::Minus); chars.next(); }
            '*' => { tokens.push(Token::Star); chars.next(); }
            '/' => { tokens.push(Token::Slash); chars.next(); }
            '(' => { tokens.push(Token::LParen); chars.next(); }
            ')' => { tokens.push(Token::RParen); chars.next(); }
            ',' => { tokens.push(Token::Comma); chars.next(); }
            'A'..='Z' | 'a'..='z' | '_' => {
                let mut ident = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_ascii_alphanumeric() || ch == '_' {
                        ident.push(ch);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(ident));
            }
            '0'..='9' | '.' => {
                let mut num_str = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' {
                        num_str.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let num: f64 = num_str.parse().map_err(|_| format!("Invalid number: {num_str}"))?;
                tokens.push(Token::Number(num));
            }
            _ => return Err(format!("Unexpected character: {c}")),
        }
    }

    Ok(tokens)
}

// =============================================================================
// Recursive descent
// =============================================================================

fn parse_add_sub(tokens: &[Token], pos: usize) -> Result<(Expr, usize), String> {
    let (mut left, mut pos) = parse_mul_div(tokens, pos)?;

    while pos < tokens.len() {
        let op = match &tokens[pos] {
            Token::Plus => Op::Add,
            Token::Minus => Op::Sub,
            _ => break,
        };
        let (right, new_pos) = parse_mul_div(tokens, pos + 1)?;
        left = Expr::BinaryOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        };
        pos = new_pos;
    }

    Ok((left, pos))
}

fn parse_mul_div(tokens: &[Token], pos: usize) -> Result<(Expr, usize), String> {
    let (mut left, mut pos) = parse_primary(tokens, pos)?;

    while pos < tokens.len() {
        let op = match &tokens[pos] {
            Token::Star => Op::Mul,
            Token::Slash => Op::Div,
            _ => break,
        };
        let (right, new_pos) = parse_primary(tokens, pos + 1)?;
        left = Expr::BinaryOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        };
        pos = new_pos;
    }

    Ok((left, pos))
}

fn parse_primary(tokens: &[Token], pos: usize) -> Result<(Expr, usize), String> {
    if pos >= tokens.len() {
        return Err("Unexpected end of expression".to_string());
    }

    match &tokens[pos] {
        Token::Number(n) => Ok((Expr::Number(*n), pos + 1)),
        Token::Ident(name) => {
            // Function call
            if let Some(Token::LParen) = tokens.get(pos + 1) {
                let func = Function::from_name(name)
                    .ok_or_else(|| format!("Unknown function: {name}"))?;
                let (args, new_pos) = parse_function_args(tokens, pos + 2)?;
                func.check_arity(args.len())?;
                return Ok((Expr::Function { func, args }, new_pos));
            }
            Ok((Expr::Indicator(name.clone()), pos + 1))
        }
        Token::LParen => {
            let (expr, pos) = parse_add_sub(tokens, pos + 1)?;
            match tokens.get(pos) {
                Some(Token::RParen) => Ok((expr, pos + 1)),
                Some(_) => Err("Expected closing parenthesis".to_string()),
                None => Err("Missing closing parenthesis".to_string()),
            }
        }
        Token::Plus => parse_primary(tokens, pos + 1),
        Token::Minus => {
            // Unary minus
            let (expr, pos) = parse_primary(tokens, pos + 1)?;
            Ok((
                Expr::BinaryOp {
                    op: Op::Sub,
                    left: Box::new(Expr::Number(0.0)),
                    right: Box::new(expr),
                },
                pos,
            ))
        }
        _ => Err(format!("Unexpected token at position {pos}")),
    }
}

fn parse_function_args(tokens: &[Token], pos: usize) -> Result<(Vec<Expr>, usize), String> {
    let mut args = Vec::new();
    let mut pos = pos;

    if let Some(Token::RParen) = tokens.get(pos) {
        return Ok((args, pos + 1));
    }

    loop {
        let (arg, new_pos) = parse_add_sub(tokens, pos)?;
        args.push(arg);
        pos = new_pos;

        match tokens.get(pos) {
            Some(Token::RParen) => return Ok((args, pos + 1)),
            Some(Token::Comma) => pos += 1,
            Some(_) => return Err("Expected comma or closing parenthesis".to_string()),
            None => return Err("Missing closing parenthesis in function call".to_string()),
        }
    }
}

// =============================================================================
// Column-wise evaluation
// =============================================================================

/// Values of an expression for every unit, plus which units divided by zero or null.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnEval {
    pub values: Vec<Option<f64>>,
    pub div_zero: Vec<bool>,
}

impl ColumnEval {
    fn nulls(units: usize) -> Self {
        Self {
            values: vec![None; units],
            div_zero: vec![false; units],
        }
    }

    pub fn div_zero_count(&self) -> usize {
        self.div_zero.iter().filter(|d| **d).count()
    }
}

/// Evaluate `expr` over `units` units.
///
/// `lookup` returns the column of an already-computed indicator. Any null
/// operand yields null; division by zero or null yields null and is flagged.
pub fn evaluate<'a, F>(expr: &Expr, units: usize, lookup: &F) -> ColumnEval
where
    F: Fn(&str) -> Option<&'a [Option<f64>]>,
{
    match expr {
        Expr::Number(n) => ColumnEval {
            values: vec![Some(*n); units],
            div_zero: vec![false; units],
        },
        Expr::Indicator(name) => match lookup(name) {
            Some(column) => {
                let mut values = column.to_vec();
                values.resize(units, None);
                ColumnEval {
                    values,
                    div_zero: vec![false; units],
                }
            }
            None => {
                log::warn!("calculation references '{name}' which has no values");
                ColumnEval::nulls(units)
            }
        },
        Expr::BinaryOp { op, left, right } => {
            let l = evaluate(left, units, lookup);
            let r = evaluate(right, units, lookup);
            let mut out = ColumnEval::nulls(units);
            for i in 0..units {
                out.div_zero[i] = l.div_zero[i] || r.div_zero[i];
                let zero_divisor = r.values[i].map_or(l.values[i].is_some(), |d| d == 0.0);
                if *op == Op::Div && zero_divisor {
                    out.div_zero[i] = true;
                    continue;
                }
                out.values[i] = match (l.values[i], r.values[i]) {
                    (Some(a), Some(b)) => apply(*op, a, b),
                    _ => None,
                };
            }
            out
        }
        Expr::Function { func, args } => {
            let evaluated: Vec<ColumnEval> = args.iter().map(|a| evaluate(a, units, lookup)).collect();
            eval_function(*func, evaluated, units)
        }
    }
}

fn apply(op: Op, a: f64, b: f64) -> Option<f64> {
    let v = match op {
        Op::Add => a + b,
        Op::Sub => a - b,
        Op::Mul => a * b,
        Op::Div => a / b,
    };
    v.is_finite().then_some(v)
}

fn eval_function(func: Function, mut args: Vec<ColumnEval>, units: usize) -> ColumnEval {
    if args.is_empty() {
        return ColumnEval::nulls(units);
    }
    match func {
        Function::ZScore => {
            let arg = args.swap_remove(0);
            ColumnEval {
                values: zscore(&arg.values),
                div_zero: arg.div_zero,
            }
        }
        Function::Abs => {
            let mut arg = args.swap_remove(0);
            for v in arg.values.iter_mut() {
                *v = v.map(f64::abs);
            }
            arg
        }
        Function::Min | Function::Max => {
            let mut out = ColumnEval::nulls(units);
            for i in 0..units {
                out.div_zero[i] = args.iter().any(|a| a.div_zero[i]);
                let mut acc: Option<f64> = None;
                for arg in &args {
                    let Some(v) = arg.values[i] else {
                        acc = None;
                        break;
                    };
                    acc = Some(match (acc, func) {
                        (None, _) => v,
                        (Some(a), Function::Min) => a.min(v),
                        (Some(a), _) => a.max(v),
                    });
                }
                out.values[i] = acc;
            }
            out
        }
    }
}

/// Standard score against the mean and sample standard deviation of the
/// non-null values. Fewer than two values or zero variance yields all nulls.
pub fn zscore(values: &[Option<f64>]) -> Vec<Option<f64>> {
    let present: Vec<f64> = values.iter().flatten().copied().collect();
    let n = present.len();
    if n < 2 {
        log::warn!("zscore over {n} value(s); result is null for every unit");
        return vec![None; values.len()];
    }

    let mean = present.iter().sum::<f64>() / n as f64;
    let variance = present.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / (n - 1) as f64;
    let sd = variance.sqrt();
    if sd == 0.0 || !sd.is_finite() {
        log::warn!("zscore over zero-variance column; result is null for every unit");
        return vec![None; values.len()];
    }

    values.iter().map(|v| v.map(|x| (x - mean) / sd)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn eval_with(expr: &str, columns: &HashMap<&str, Vec<Option<f64>>>, units: usize) -> ColumnEval {
        let expr = parse(expr).unwrap();
        let lookup = |name: &str| columns.get(name).map(|v| v.as_slice());
        evaluate(&expr, units, &lookup)
    }

    #[test]
    fn parse_complement() {
        let expr = parse("100 - PCT_NO_CAR").unwrap();
        assert_eq!(
            expr,
            Expr::BinaryOp {
                op: Op::Sub,
                left: Box::new(Expr::Number(100.0)),
                right: Box::new(Expr::Indicator("PCT_NO_CAR".into())),
            }
        );
    }

    #[test]
    fn precedence_and_parens() {
        let cols = HashMap::new();
        assert_eq!(eval_with("1 + 2 * 3", &cols, 1).values, vec![Some(7.0)]);
        assert_eq!(eval_with("(1 + 2) * 3", &cols, 1).values, vec![Some(9.0)]);
        assert_eq!(eval_with("-2 * 3", &cols, 1).values, vec![Some(-6.0)]);
        assert_eq!(eval_with("10 / 4 / 5", &cols, 1).values, vec![Some(0.5)]);
    }

    #[test]
    fn referenced_names_deduplicated() {
        let expr = parse("zscore(A) + zscore(B) - A").unwrap();
        assert_eq!(referenced_indicators(&expr), vec!["A", "B"]);
    }

    #[test]
    fn function_names_case_insensitive() {
        assert!(parse("ZScore(A)").is_ok());
        assert!(parse("max(A, B, 0)").is_ok());
    }

    #[test]
    fn parse_errors() {
        assert!(parse("").is_err());
        assert!(parse("100 -").is_err());
        assert!(parse("(A + B").is_err());
        assert!(parse("A B").is_err());
        assert!(parse("log(A)").unwrap_err().contains("Unknown function"));
        assert!(parse("zscore(A, B)").is_err());
        assert!(parse("abs()").is_err());
        assert!(parse("A % 2").is_err());
    }

    #[test]
    fn nulls_propagate() {
        let mut cols = HashMap::new();
        cols.insert("X", vec![Some(40.0), None]);
        let out = eval_with("100 - X", &cols, 2);
        assert_eq!(out.values, vec![Some(60.0), None]);
        assert_eq!(out.div_zero_count(), 0);
    }

    #[test]
    fn division_by_zero_or_null_is_null_and_flagged() {
        let mut cols = HashMap::new();
        cols.insert("N", vec![Some(1.0), Some(2.0), None, Some(3.0)]);
        cols.insert("D", vec![Some(0.0), None, Some(0.0), Some(4.0)]);
        let out = eval_with("N / D", &cols, 4);
        assert_eq!(out.values, vec![None, None, None, Some(0.75)]);
        assert_eq!(out.div_zero, vec![true, true, true, false]);
    }

    #[test]
    fn min_max_abs() {
        let mut cols = HashMap::new();
        cols.insert("A", vec![Some(-3.0), Some(5.0), None]);
        cols.insert("B", vec![Some(2.0), Some(1.0), Some(1.0)]);
        assert_eq!(eval_with("min(A, B)", &cols, 3).values, vec![Some(-3.0), Some(1.0), None]);
        assert_eq!(eval_with("max(A, B)", &cols, 3).values, vec![Some(2.0), Some(5.0), None]);
        assert_eq!(eval_with("abs(A)", &cols, 3).values, vec![Some(3.0), Some(5.0), None]);
    }

    #[test]
    fn zscore_sample_sd() {
        // mean 4, sample sd sqrt(((2)^2 + 0 + 2^2) / 2) = 2
        let z = zscore(&[Some(2.0), Some(4.0), None, Some(6.0)]);
        assert_eq!(z, vec![Some(-1.0), Some(0.0), None, Some(1.0)]);
    }

    #[test]
    fn zscore_zero_variance_is_all_null() {
        assert_eq!(zscore(&[Some(5.0), Some(5.0), Some(5.0)]), vec![None, None, None]);
    }

    #[test]
    fn zscore_single_value_is_all_null() {
        assert_eq!(zscore(&[Some(5.0), None]), vec![None, None]);
    }

    #[test]
    fn unknown_indicator_evaluates_to_null() {
        let cols = HashMap::new();
        assert_eq!(eval_with("GHOST + 1", &cols, 2).values, vec![None, None]);
    }
}
