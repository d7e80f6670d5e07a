//! Response generation: a `ResponseBuilder` that walks a selection set and produces
//! type-appropriate values, consulting the layered resolver map before falling back to
//! the built-in scalar/enum generators. Adapted from the teacher's `ResponseBuilder` in
//! `handle/graphql.rs`, with randomness kept only where no fixed mock applies.
use std::collections::HashMap;
use std::ops::RangeInclusive;

use anyhow::anyhow;
use apollo_compiler::schema::ExtendedType;
use apollo_compiler::validation::Valid;
use apollo_compiler::{ExecutableDocument, Name, Node, Schema};
use apollo_compiler::executable::{Field, Selection, SelectionSet};
use rand::rngs::ThreadRng;
use rand::seq::IteratorRandom;
use rand::Rng;
use serde_json_bytes::serde_json::Number;
use serde_json_bytes::{ByteString, Map, Value};

use crate::mock::resolvers::{FieldMock, ResolverMap, ResolverSource};

#[derive(Debug, Clone, Copy)]
pub struct ArraySize {
    pub min_length: usize,
    pub max_length: usize,
}

impl Default for ArraySize {
    fn default() -> Self {
        Self { min_length: 0, max_length: 10 }
    }
}

impl ArraySize {
    fn range(&self) -> RangeInclusive<usize> {
        self.min_length..=self.max_length
    }
}

/// A scalar's randomized-value generator, used whenever no fixed mock applies. One entry
/// per built-in GraphQL scalar, grounded in the teacher's `ScalarGenerator`.
#[derive(Debug, Clone, Copy)]
pub enum ScalarGenerator {
    Bool,
    Int { min: i32, max: i32 },
    Float { min: f64, max: f64 },
    String { min_len: usize, max_len: usize },
}

impl ScalarGenerator {
    pub const DEFAULT: Self = Self::String { min_len: 1, max_len: 10 };

    fn generate(&self, rng: &mut ThreadRng) -> Value {
        match *self {
            Self::Bool => Value::Bool(rng.random_bool(0.5)),
            Self::Int { min, max } => Value::Number(rng.random_range(min..=max).into()),
            Self::Float { min, max } => {
                Value::Number(Number::from_f64(rng.random_range(min..=max)).expect("finite float"))
            }
            Self::String { min_len, max_len } => {
                let len = rng.random_range(min_len..=max_len);
                let s: String = (0..len).map(|_| rng.sample(rand::distr::Alphanumeric) as char).collect();
                Value::String(ByteString::from(s))
            }
        }
    }
}

pub fn default_scalars() -> HashMap<String, ScalarGenerator> {
    [
        ("Boolean".into(), ScalarGenerator::Bool),
        ("Int".into(), ScalarGenerator::Int { min: 0, max: 100 }),
        ("ID".into(), ScalarGenerator::Int { min: 0, max: 100 }),
        ("Float".into(), ScalarGenerator::Float { min: -1.0, max: 1.0 }),
        ("String".into(), ScalarGenerator::String { min_len: 1, max_len: 10 }),
    ]
    .into_iter()
    .collect()
}

pub struct GenerationConfig {
    pub scalars: HashMap<String, ScalarGenerator>,
    pub array: ArraySize,
    pub null_ratio: Option<(u32, u32)>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self { scalars: default_scalars(), array: ArraySize::default(), null_ratio: Some((1, 2)) }
    }
}

/// Walks an operation's selection set, producing a value for each field from, in order:
/// a per-call override, the resolver source (subgraph-specific then global), or the
/// built-in generator for its scalar/enum type.
pub struct ResponseBuilder<'a, 'doc, 'schema> {
    rng: ThreadRng,
    doc: &'doc Valid<ExecutableDocument>,
    schema: &'schema Valid<Schema>,
    cfg: &'a GenerationConfig,
    resolvers: &'a ResolverSource,
    overrides: Option<&'a ResolverMap>,
    subgraph_name: &'a str,
}

impl<'a, 'doc, 'schema> ResponseBuilder<'a, 'doc, 'schema> {
    pub fn new(
        doc: &'doc Valid<ExecutableDocument>,
        schema: &'schema Valid<Schema>,
        cfg: &'a GenerationConfig,
        resolvers: &'a ResolverSource,
        overrides: Option<&'a ResolverMap>,
        subgraph_name: &'a str,
    ) -> Self {
        Self {
            rng: rand::rng(),
            doc,
            schema,
            cfg,
            resolvers,
            overrides,
            subgraph_name,
        }
    }

    pub fn selection_set(&mut self, selection_set: &SelectionSet) -> anyhow::Result<Map<ByteString, Value>> {
        let grouped_fields = self.collect_fields(selection_set)?;
        let mut result = Map::new();

        for (key, fields) in grouped_fields {
            let meta_field = fields[0];
            let type_name = selection_set.ty.to_string();

            let val = if meta_field.name == "__typename" {
                Value::String(ByteString::from(type_name))
            } else if let Some(fixed) = self.fixed_value(&type_name, meta_field.name.as_str()) {
                fixed
            } else if !meta_field.ty().is_non_null() && self.should_be_null() {
                Value::Null
            } else {
                let is_selection_set = !meta_field.selection_set.is_empty();
                let is_array = meta_field.ty().is_list();

                if is_selection_set {
                    let mut selections = Vec::new();
                    for field in &fields {
                        selections.extend_from_slice(&field.selection_set.selections);
                    }
                    let full_selection_set = SelectionSet {
                        ty: meta_field.selection_set.ty.clone(),
                        selections,
                    };

                    if is_array {
                        Value::Array(self.array_selection_set(&full_selection_set)?)
                    } else {
                        Value::Object(self.selection_set(&full_selection_set)?)
                    }
                } else {
                    match is_array {
                        false => self.leaf_field(meta_field.ty().inner_named_type())?,
                        true => self.array_leaf_field(meta_field.ty().inner_named_type())?,
                    }
                }
            };

            result.insert(key, val);
        }

        Ok(result)
    }

    fn fixed_value(&self, type_name: &str, field_name: &str) -> Option<Value> {
        let map = crate::mock::resolvers::ResolverCache::resolve_for_type(
            self.resolvers,
            self.subgraph_name,
            self.overrides,
            type_name,
        )?;
        let mock = map.get(field_name)?;

        Some(match mock {
            FieldMock::Value { value } => value.clone(),
            FieldMock::Enum { r#enum } => {
                let mut rng = rand::rng();
                let chosen = r#enum.iter().choose(&mut rng)?;
                Value::String(ByteString::from(chosen.clone()))
            }
            FieldMock::Range { range } => {
                let mut rng = rand::rng();
                Value::Number(rng.random_range(range[0]..=range[1]).into())
            }
        })
    }

    fn collect_fields(
        &self,
        selection_set: &'doc SelectionSet,
    ) -> anyhow::Result<HashMap<String, Vec<&'doc Node<Field>>>> {
        let mut collected_fields: HashMap<String, Vec<&Node<Field>>> = HashMap::new();

        for selection in &selection_set.selections {
            match selection {
                Selection::Field(field) => {
                    let key = field.alias.as_ref().unwrap_or(&field.name).to_string();
                    collected_fields.entry(key).or_default().push(field);
                }
                Selection::FragmentSpread(fragment) => {
                    if let Some(fragment_def) = self.doc.fragments.get(&fragment.fragment_name) {
                        for (key, mut fields) in self.collect_fields(&fragment_def.selection_set)? {
                            collected_fields.entry(key).or_default().append(&mut fields);
                        }
                    }
                }
                Selection::InlineFragment(inline_fragment) => {
                    for (key, mut fields) in self.collect_fields(&inline_fragment.selection_set)? {
                        collected_fields.entry(key).or_default().append(&mut fields);
                    }
                }
            }
        }

        Ok(collected_fields)
    }

    fn leaf_field(&mut self, type_name: &Name) -> anyhow::Result<Value> {
        match self.schema.types.get(type_name).unwrap() {
            ExtendedType::Enum(enum_ty) => {
                let enum_value = enum_ty
                    .values
                    .values()
                    .choose(&mut self.rng)
                    .ok_or_else(|| anyhow!("empty enum: {type_name}"))?;
                Ok(Value::String(ByteString::from(enum_value.value.to_string())))
            }
            ExtendedType::Scalar(scalar) => Ok(self
                .cfg
                .scalars
                .get(scalar.name.as_str())
                .unwrap_or(&ScalarGenerator::DEFAULT)
                .generate(&mut self.rng)),
            _ => unreachable!("a field with an empty selection set must be a scalar or enum type"),
        }
    }

    fn arbitrary_array_len(&mut self) -> usize {
        self.rng.random_range(self.cfg.array.range())
    }

    fn array_selection_set(&mut self, selection_set: &SelectionSet) -> anyhow::Result<Vec<Value>> {
        let num_values = self.arbitrary_array_len();
        let mut values = Vec::with_capacity(num_values);
        for _ in 0..num_values {
            values.push(Value::Object(self.selection_set(selection_set)?));
        }
        Ok(values)
    }

    fn array_leaf_field(&mut self, type_name: &Name) -> anyhow::Result<Value> {
        let num_values = self.arbitrary_array_len();
        let mut values = Vec::with_capacity(num_values);
        for _ in 0..num_values {
            values.push(self.leaf_field(type_name)?);
        }
        Ok(Value::Array(values))
    }

    fn should_be_null(&mut self) -> bool {
        match self.cfg.null_ratio {
            Some((numerator, denominator)) => self.rng.random_ratio(numerator, denominator),
            None => false,
        }
    }
}
