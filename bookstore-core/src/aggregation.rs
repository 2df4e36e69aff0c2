// src/aggregation.rs
// Aggregation pipelines: $match, $project, $group, $sort, $limit, $skip,
// $count, plus the expression language used inside them

use crate::error::{BookstoreError, Result};
use crate::filter::Filter;
use crate::find_options::sort_documents;
use serde_json::{Map, Number, Value};
use std::collections::HashMap;

/// A parsed pipeline: stages run left to right over the document set.
#[derive(Debug, Clone)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

#[derive(Debug, Clone)]
enum Stage {
    Match(Filter),
    Project(Vec<ProjectField>),
    Group {
        key: Expr,
        accumulators: Vec<(String, Accumulator)>,
    },
    Sort(Vec<(String, i32)>),
    Limit(usize),
    Skip(usize),
    Count(String),
}

#[derive(Debug, Clone)]
enum ProjectField {
    Include(String),
    Exclude(String),
    Computed(String, Expr),
}

#[derive(Debug, Clone)]
enum Accumulator {
    /// `{$sum: 1}` counts; `{$sum: "$field"}` totals.
    Sum(SumInput),
    Avg(Expr),
    Min(Expr),
    Max(Expr),
    First(Expr),
    Last(Expr),
}

#[derive(Debug, Clone)]
enum SumInput {
    Constant(f64),
    Expr(Expr),
}

/// Aggregation expressions: literals, `$field` references, and a small
/// set of operators.
#[derive(Debug, Clone)]
enum Expr {
    Literal(Value),
    Field(String),
    Concat(Vec<Expr>),
    ToString(Box<Expr>),
    Arith(ArithOp, Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, Copy)]
enum ArithOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Mod,
}

impl Pipeline {
    pub fn parse(stages: &[Value]) -> Result<Self> {
        let stages = stages
            .iter()
            .map(Stage::parse)
            .collect::<Result<Vec<_>>>()?;
        Ok(Pipeline { stages })
    }

    pub fn execute(&self, mut docs: Vec<Value>) -> Result<Vec<Value>> {
        for stage in &self.stages {
            docs = stage.execute(docs)?;
        }
        Ok(docs)
    }
}

impl Stage {
    fn parse(value: &Value) -> Result<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| BookstoreError::AggregationError("stage must be an object".into()))?;
        if obj.len() != 1 {
            return Err(BookstoreError::AggregationError(
                "stage must have exactly one operator".into(),
            ));
        }
        let (op, spec) = obj.iter().next().unwrap();

        match op.as_str() {
            "$match" => Ok(Stage::Match(Filter::parse(spec)?)),
            "$project" => Self::parse_project(spec),
            "$group" => Self::parse_group(spec),
            "$sort" => Self::parse_sort(spec),
            "$limit" => spec
                .as_u64()
                .map(|n| Stage::Limit(n as usize))
                .ok_or_else(|| {
                    BookstoreError::AggregationError("$limit requires a positive integer".into())
                }),
            "$skip" => spec
                .as_u64()
                .map(|n| Stage::Skip(n as usize))
                .ok_or_else(|| {
                    BookstoreError::AggregationError("$skip requires a positive integer".into())
                }),
            "$count" => spec
                .as_str()
                .map(|s| Stage::Count(s.to_string()))
                .ok_or_else(|| {
                    BookstoreError::AggregationError("$count requires a field name".into())
                }),
            other => Err(BookstoreError::AggregationError(format!(
                "Unknown pipeline stage: {}",
                other
            ))),
        }
    }

    fn parse_project(spec: &Value) -> Result<Self> {
        let obj = spec.as_object().ok_or_else(|| {
            BookstoreError::AggregationError("$project requires an object".into())
        })?;

        let mut fields = Vec::with_capacity(obj.len());
        for (name, value) in obj {
            let field = match value {
                Value::Number(n) if n.as_f64() == Some(0.0) => {
                    ProjectField::Exclude(name.clone())
                }
                Value::Number(_) => ProjectField::Include(name.clone()),
                Value::Bool(false) => ProjectField::Exclude(name.clone()),
                Value::Bool(true) => ProjectField::Include(name.clone()),
                other => ProjectField::Computed(name.clone(), Expr::parse(other)?),
            };
            fields.push(field);
        }
        Ok(Stage::Project(fields))
    }

    fn parse_group(spec: &Value) -> Result<Self> {
        let obj = spec
            .as_object()
            .ok_or_else(|| BookstoreError::AggregationError("$group requires an object".into()))?;
        let key = obj
            .get("_id")
            .ok_or_else(|| BookstoreError::AggregationError("$group requires _id".into()))?;
        let key = Expr::parse(key)?;

        let mut accumulators = Vec::new();
        for (name, acc_spec) in obj {
            if name == "_id" {
                continue;
            }
            accumulators.push((name.clone(), Accumulator::parse(acc_spec)?));
        }

        Ok(Stage::Group { key, accumulators })
    }

    fn parse_sort(spec: &Value) -> Result<Self> {
        let obj = spec
            .as_object()
            .ok_or_else(|| BookstoreError::AggregationError("$sort requires an object".into()))?;
        let mut keys = Vec::with_capacity(obj.len());
        for (field, dir) in obj {
            let dir = dir.as_i64().filter(|d| *d == 1 || *d == -1).ok_or_else(|| {
                BookstoreError::AggregationError(format!(
                    "Sort direction for '{}' must be 1 or -1",
                    field
                ))
            })?;
            keys.push((field.clone(), dir as i32));
        }
        Ok(Stage::Sort(keys))
    }

    fn execute(&self, docs: Vec<Value>) -> Result<Vec<Value>> {
        match self {
            Stage::Match(filter) => Ok(docs.into_iter().filter(|d| filter.matches(d)).collect()),
            Stage::Project(fields) => docs.iter().map(|d| project_doc(d, fields)).collect(),
            Stage::Group { key, accumulators } => group_docs(&docs, key, accumulators),
            Stage::Sort(keys) => {
                let mut docs = docs;
                sort_documents(&mut docs, keys);
                Ok(docs)
            }
            Stage::Limit(n) => Ok(docs.into_iter().take(*n).collect()),
            Stage::Skip(n) => Ok(docs.into_iter().skip(*n).collect()),
            Stage::Count(name) => {
                let mut out = Map::new();
                out.insert(name.clone(), Value::from(docs.len()));
                Ok(vec![Value::Object(out)])
            }
        }
    }
}

fn project_doc(doc: &Value, fields: &[ProjectField]) -> Result<Value> {
    let empty = Map::new();
    let obj = doc.as_object().unwrap_or(&empty);
    let has_includes = fields
        .iter()
        .any(|f| matches!(f, ProjectField::Include(_) | ProjectField::Computed(..)));

    let mut out = if has_includes {
        // Include mode keeps _id unless excluded
        let mut out = Map::new();
        if let Some(id) = obj.get("_id") {
            out.insert("_id".to_string(), id.clone());
        }
        out
    } else {
        obj.clone()
    };

    for field in fields {
        match field {
            ProjectField::Include(name) => {
                if let Some(v) = obj.get(name) {
                    out.insert(name.clone(), v.clone());
                }
            }
            ProjectField::Exclude(name) => {
                out.remove(name);
            }
            ProjectField::Computed(name, expr) => {
                out.insert(name.clone(), expr.evaluate(doc)?);
            }
        }
    }

    Ok(Value::Object(out))
}

fn group_docs(
    docs: &[Value],
    key: &Expr,
    accumulators: &[(String, Accumulator)],
) -> Result<Vec<Value>> {
    struct GroupState {
        id: Value,
        accs: Vec<AccState>,
    }

    // First-seen group order is preserved
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, GroupState> = HashMap::new();

    for doc in docs {
        let id = key.evaluate(doc)?;
        let group_key = id.to_string();

        if !groups.contains_key(&group_key) {
            order.push(group_key.clone());
        }
        let state = groups.entry(group_key).or_insert_with(|| GroupState {
            id,
            accs: accumulators.iter().map(|_| AccState::default()).collect(),
        });

        for ((_, acc), acc_state) in accumulators.iter().zip(state.accs.iter_mut()) {
            acc.accumulate(doc, acc_state)?;
        }
    }

    let mut results = Vec::with_capacity(order.len());
    for group_key in order {
        let state = groups.remove(&group_key).unwrap();
        let mut out = Map::new();
        out.insert("_id".to_string(), state.id);
        for ((name, acc), acc_state) in accumulators.iter().zip(state.accs) {
            out.insert(name.clone(), acc.finalize(acc_state));
        }
        results.push(Value::Object(out));
    }
    Ok(results)
}

/// Running state for one accumulator in one group.
#[derive(Debug, Default)]
struct AccState {
    sum: f64,
    count: u64,
    min: Option<Value>,
    max: Option<Value>,
    first: Option<Value>,
    last: Option<Value>,
}

impl Accumulator {
    fn parse(spec: &Value) -> Result<Self> {
        let obj = spec.as_object().ok_or_else(|| {
            BookstoreError::AggregationError("accumulator must be an object".into())
        })?;
        if obj.len() != 1 {
            return Err(BookstoreError::AggregationError(
                "accumulator must have exactly one operator".into(),
            ));
        }
        let (op, arg) = obj.iter().next().unwrap();

        match op.as_str() {
            "$sum" => match arg {
                Value::Number(n) => Ok(Accumulator::Sum(SumInput::Constant(
                    n.as_f64().unwrap_or(0.0),
                ))),
                other => Ok(Accumulator::Sum(SumInput::Expr(Expr::parse(other)?))),
            },
            "$avg" => Ok(Accumulator::Avg(Expr::parse(arg)?)),
            "$min" => Ok(Accumulator::Min(Expr::parse(arg)?)),
            "$max" => Ok(Accumulator::Max(Expr::parse(arg)?)),
            "$first" => Ok(Accumulator::First(Expr::parse(arg)?)),
            "$last" => Ok(Accumulator::Last(Expr::parse(arg)?)),
            other => Err(BookstoreError::AggregationError(format!(
                "Unknown accumulator: {}",
                other
            ))),
        }
    }

    fn accumulate(&self, doc: &Value, state: &mut AccState) -> Result<()> {
        match self {
            Accumulator::Sum(SumInput::Constant(c)) => {
                state.sum += c;
                state.count += 1;
            }
            Accumulator::Sum(SumInput::Expr(expr)) | Accumulator::Avg(expr) => {
                let value = expr.evaluate(doc)?;
                if let Some(n) = value.as_f64() {
                    state.sum += n;
                    state.count += 1;
                }
            }
            Accumulator::Min(expr) => {
                let value = expr.evaluate(doc)?;
                if !value.is_null() {
                    let replace = match &state.min {
                        Some(current) => {
                            crate::filter::compare_values(&value, current)
                                == Some(std::cmp::Ordering::Less)
                        }
                        None => true,
                    };
                    if replace {
                        state.min = Some(value);
                    }
                }
            }
            Accumulator::Max(expr) => {
                let value = expr.evaluate(doc)?;
                if !value.is_null() {
                    let replace = match &state.max {
                        Some(current) => {
                            crate::filter::compare_values(&value, current)
                                == Some(std::cmp::Ordering::Greater)
                        }
                        None => true,
                    };
                    if replace {
                        state.max = Some(value);
                    }
                }
            }
            Accumulator::First(expr) => {
                if state.first.is_none() {
                    state.first = Some(expr.evaluate(doc)?);
                }
            }
            Accumulator::Last(expr) => {
                state.last = Some(expr.evaluate(doc)?);
            }
        }
        Ok(())
    }

    fn finalize(&self, state: AccState) -> Value {
        match self {
            Accumulator::Sum(_) => number(state.sum),
            Accumulator::Avg(_) => {
                if state.count == 0 {
                    Value::Null
                } else {
                    number(state.sum / state.count as f64)
                }
            }
            Accumulator::Min(_) => state.min.unwrap_or(Value::Null),
            Accumulator::Max(_) => state.max.unwrap_or(Value::Null),
            Accumulator::First(_) => state.first.unwrap_or(Value::Null),
            Accumulator::Last(_) => state.last.unwrap_or(Value::Null),
        }
    }
}

impl Expr {
    fn parse(value: &Value) -> Result<Self> {
        match value {
            Value::String(s) if s.starts_with('$') => Ok(Expr::Field(s[1..].to_string())),
            Value::Object(obj) if obj.len() == 1 => {
                let (op, arg) = obj.iter().next().unwrap();
                match op.as_str() {
                    "$concat" => {
                        let parts = arg.as_array().ok_or_else(|| {
                            BookstoreError::AggregationError("$concat requires an array".into())
                        })?;
                        Ok(Expr::Concat(
                            parts.iter().map(Expr::parse).collect::<Result<Vec<_>>>()?,
                        ))
                    }
                    "$toString" => Ok(Expr::ToString(Box::new(Expr::parse(arg)?))),
                    "$add" => Self::parse_arith(ArithOp::Add, arg),
                    "$subtract" => Self::parse_arith(ArithOp::Subtract, arg),
                    "$multiply" => Self::parse_arith(ArithOp::Multiply, arg),
                    "$divide" => Self::parse_arith(ArithOp::Divide, arg),
                    "$mod" => Self::parse_arith(ArithOp::Mod, arg),
                    _ if op.starts_with('$') => Err(BookstoreError::AggregationError(
                        format!("Unknown expression operator: {}", op),
                    )),
                    _ => Ok(Expr::Literal(value.clone())),
                }
            }
            other => Ok(Expr::Literal(other.clone())),
        }
    }

    fn parse_arith(op: ArithOp, arg: &Value) -> Result<Self> {
        let parts = arg.as_array().filter(|a| a.len() == 2).ok_or_else(|| {
            BookstoreError::AggregationError(
                "Arithmetic operators require an array of two operands".into(),
            )
        })?;
        Ok(Expr::Arith(
            op,
            Box::new(Expr::parse(&parts[0])?),
            Box::new(Expr::parse(&parts[1])?),
        ))
    }

    fn evaluate(&self, doc: &Value) -> Result<Value> {
        match self {
            Expr::Literal(v) => Ok(v.clone()),
            Expr::Field(name) => Ok(doc.get(name.as_str()).cloned().unwrap_or(Value::Null)),
            Expr::Concat(parts) => {
                let mut out = String::new();
                for part in parts {
                    match part.evaluate(doc)? {
                        // A null operand nulls the whole concat
                        Value::Null => return Ok(Value::Null),
                        Value::String(s) => out.push_str(&s),
                        other => {
                            return Err(BookstoreError::AggregationError(format!(
                                "$concat only supports strings, got {}",
                                other
                            )))
                        }
                    }
                }
                Ok(Value::String(out))
            }
            Expr::ToString(inner) => match inner.evaluate(doc)? {
                Value::Null => Ok(Value::Null),
                Value::String(s) => Ok(Value::String(s)),
                Value::Bool(b) => Ok(Value::String(b.to_string())),
                Value::Number(n) => {
                    // Whole numbers render without a decimal point
                    if let Some(i) = n.as_i64() {
                        Ok(Value::String(i.to_string()))
                    } else {
                        Ok(Value::String(n.to_string()))
                    }
                }
                other => Err(BookstoreError::AggregationError(format!(
                    "$toString cannot convert {}",
                    other
                ))),
            },
            Expr::Arith(op, lhs, rhs) => {
                let lhs = lhs.evaluate(doc)?;
                let rhs = rhs.evaluate(doc)?;
                if lhs.is_null() || rhs.is_null() {
                    return Ok(Value::Null);
                }
                let (Some(a), Some(b)) = (lhs.as_f64(), rhs.as_f64()) else {
                    return Err(BookstoreError::AggregationError(
                        "Arithmetic operands must be numbers".into(),
                    ));
                };

                // Integer arithmetic stays integral, except $divide
                if let (Some(ia), Some(ib)) = (lhs.as_i64(), rhs.as_i64()) {
                    let result = match op {
                        ArithOp::Add => Some(ia + ib),
                        ArithOp::Subtract => Some(ia - ib),
                        ArithOp::Multiply => Some(ia * ib),
                        ArithOp::Divide => None,
                        ArithOp::Mod => {
                            if ib == 0 {
                                return Err(BookstoreError::AggregationError(
                                    "$mod by zero".into(),
                                ));
                            }
                            Some(ia % ib)
                        }
                    };
                    if let Some(i) = result {
                        return Ok(Value::from(i));
                    }
                }

                let result = match op {
                    ArithOp::Add => a + b,
                    ArithOp::Subtract => a - b,
                    ArithOp::Multiply => a * b,
                    ArithOp::Divide => {
                        if b == 0.0 {
                            return Err(BookstoreError::AggregationError(
                                "$divide by zero".into(),
                            ));
                        }
                        a / b
                    }
                    ArithOp::Mod => {
                        if b == 0.0 {
                            return Err(BookstoreError::AggregationError("$mod by zero".into()));
                        }
                        a % b
                    }
                };
                Ok(number(result))
            }
        }
    }
}

/// Integral results become JSON integers, everything else floats.
fn number(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        Value::from(value as i64)
    } else {
        Number::from_f64(value).map(Value::Number).unwrap_or(Value::Null)
    }
}
