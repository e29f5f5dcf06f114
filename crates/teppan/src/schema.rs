//! # Schema Index
//!
//! Maps declared input and output names onto the positional calling
//! convention of the wrapped model. Names follow `<base>__<index>`, where
//! `index` is the argument (or result) position the tensor occupies.
//!
//! The index is built once per model instance and is immutable afterwards;
//! execution cycles only ever borrow it.
use std::collections::BTreeMap;

use crate::config::{Control, ControlKind, ModelConfig, TensorConfig};
use crate::dtype::DataType;
use crate::error::{NamingConventionError, SchemaError};

const DELIMITER: &str = "__";

/// Parse the positional index out of a `<base>__<index>` name.
///
/// The name is split on the first `__`; everything after it must be a
/// non-empty run of ASCII digits.
pub fn parse_positional_index(name: &str) -> Result<usize, NamingConventionError> {
    let err = || NamingConventionError { name: name.to_string() };
    let (_, suffix) = name.split_once(DELIMITER).ok_or_else(err)?;
    if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return Err(err());
    }
    suffix.parse::<usize>().map_err(|_| err())
}

/// A declared output: where the model returns it and what type it must have.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputEntry {
    pub name: String,
    pub index: usize,
    pub data_type: DataType,
}

/// Immutable name to position mapping for one model instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaIndex {
    inputs: BTreeMap<String, usize>,
    outputs: Vec<OutputEntry>,
    input_arity: usize,
}

impl SchemaIndex {
    /// Validate `config` and build its index.
    ///
    /// Fails if any name breaks the naming convention, any declared type has
    /// no runtime equivalent, a sequence control is malformed, or two
    /// declarations collide on a name or a position.
    pub fn build(config: &ModelConfig) -> Result<Self, SchemaError> {
        Self::build_for(config, |data_type| data_type.is_model_supported())
    }

    /// Like [`SchemaIndex::build`], accepting only the data types `supports`
    /// admits, typically [`RuntimeTensor::supports`] of the serving runtime.
    ///
    /// [`RuntimeTensor::supports`]: crate::backend::RuntimeTensor::supports
    pub fn build_for(config: &ModelConfig, supports: fn(DataType) -> bool) -> Result<Self, SchemaError> {
        let model = config.name.as_str();
        let mut inputs: BTreeMap<String, usize> = BTreeMap::new();
        let mut by_position: BTreeMap<usize, String> = BTreeMap::new();

        let controls = sequence_controls(config, supports)?;
        let input_arity = config.input.len() + controls.len();

        let declared = config
            .input
            .iter()
            .map(|io| -> Result<(String, usize), SchemaError> {
                let index = parse_named("input", &io.name)?;
                declared_type("input", io, model, supports)?;
                Ok((io.name.clone(), index))
            })
            .chain(controls.into_iter().map(Ok));

        for entry in declared {
            let (name, index) = entry?;
            if index >= input_arity {
                return Err(SchemaError::IndexOutOfRange {
                    kind: "input",
                    name,
                    index,
                    arity: input_arity,
                    model: model.to_string(),
                });
            }
            insert_unique("input", &mut inputs, &mut by_position, name, index, model)?;
        }

        let mut outputs = Vec::with_capacity(config.output.len());
        let mut output_names: BTreeMap<String, usize> = BTreeMap::new();
        let mut output_positions: BTreeMap<usize, String> = BTreeMap::new();
        for io in &config.output {
            let index = parse_named("output", &io.name)?;
            let data_type = declared_type("output", io, model, supports)?;
            insert_unique(
                "output",
                &mut output_names,
                &mut output_positions,
                io.name.clone(),
                index,
                model,
            )?;
            outputs.push(OutputEntry {
                name: io.name.clone(),
                index,
                data_type,
            });
        }

        Ok(Self {
            inputs,
            outputs,
            input_arity,
        })
    }

    /// Position of the named input, including sequence controls.
    pub fn input_index(&self, name: &str) -> Option<usize> {
        self.inputs.get(name).copied()
    }

    pub fn inputs(&self) -> impl Iterator<Item = (&str, usize)> {
        self.inputs.iter().map(|(name, index)| (name.as_str(), *index))
    }

    pub fn output(&self, name: &str) -> Option<&OutputEntry> {
        self.outputs.iter().find(|entry| entry.name == name)
    }

    /// Outputs in declaration order.
    pub fn outputs(&self) -> &[OutputEntry] {
        &self.outputs
    }

    /// Number of positional arguments the model is called with.
    pub fn input_arity(&self) -> usize {
        self.input_arity
    }

    pub fn max_output_index(&self) -> Option<usize> {
        self.outputs.iter().map(|entry| entry.index).max()
    }
}

fn parse_named(kind: &'static str, name: &str) -> Result<usize, SchemaError> {
    parse_positional_index(name).map_err(|source| SchemaError::NamingConvention { kind, source })
}

fn declared_type(
    kind: &'static str,
    io: &TensorConfig,
    model: &str,
    supports: fn(DataType) -> bool,
) -> Result<DataType, SchemaError> {
    let data_type = DataType::from_config_str(&io.data_type).ok_or_else(|| {
        SchemaError::UnknownDataType {
            kind,
            name: io.name.clone(),
            data_type: io.data_type.clone(),
            model: model.to_string(),
        }
    })?;
    if !supports(data_type) {
        return Err(SchemaError::UnsupportedDataType {
            kind,
            name: io.name.clone(),
            data_type: io.data_type.clone(),
            model: model.to_string(),
        });
    }
    Ok(data_type)
}

fn insert_unique(
    kind: &'static str,
    names: &mut BTreeMap<String, usize>,
    positions: &mut BTreeMap<usize, String>,
    name: String,
    index: usize,
    model: &str,
) -> Result<(), SchemaError> {
    if names.contains_key(&name) {
        return Err(SchemaError::DuplicateName {
            kind,
            name,
            model: model.to_string(),
        });
    }
    if let Some(first) = positions.get(&index) {
        return Err(SchemaError::DuplicateIndex {
            kind,
            first: first.clone(),
            second: name,
            index,
            model: model.to_string(),
        });
    }
    positions.insert(index, name.clone());
    names.insert(name, index);
    Ok(())
}

/// Resolve the optional sequence controls to `(name, index)` pairs.
fn sequence_controls(
    config: &ModelConfig,
    supports: fn(DataType) -> bool,
) -> Result<Vec<(String, usize)>, SchemaError> {
    let Some(batching) = &config.sequence_batching else {
        return Ok(vec![]);
    };

    let kinds = [
        ControlKind::SequenceStart,
        ControlKind::SequenceEnd,
        ControlKind::SequenceReady,
        ControlKind::SequenceCorrid,
    ];

    let mut resolved = vec![];
    for kind in kinds {
        let mut found = batching.control_input.iter().filter_map(|input| {
            input
                .control
                .iter()
                .find(|control| control.kind == kind)
                .map(|control| (input.name.as_str(), control))
        });

        let Some((name, control)) = found.next() else {
            continue;
        };
        if found.next().is_some() {
            return Err(SchemaError::DuplicateControl {
                control: kind.as_str(),
                model: config.name.clone(),
            });
        }

        if kind == ControlKind::SequenceCorrid {
            validate_typed_control(kind, name, control, &config.name)?;
        } else {
            let data_type = validate_boolean_control(kind, name, control, &config.name)?;
            if !supports(data_type) {
                return Err(SchemaError::UnsupportedDataType {
                    kind: "input",
                    name: name.to_string(),
                    data_type: format!("TYPE_{}", data_type),
                    model: config.name.clone(),
                });
            }
        }
        resolved.push((name.to_string(), parse_named("input", name)?));
    }
    Ok(resolved)
}

/// A boolean control carries exactly one two-entry `*_false_true` table; the
/// table it uses decides the tensor type.
fn validate_boolean_control(
    kind: ControlKind,
    name: &str,
    control: &Control,
    model: &str,
) -> Result<DataType, SchemaError> {
    let tables = [
        (control.int32_false_true.len(), DataType::Int32),
        (control.fp32_false_true.len(), DataType::Fp32),
        (control.bool_false_true.len(), DataType::Bool),
    ];
    let mut present = tables.iter().filter(|(len, _)| *len > 0);
    let invalid = |reason: &str| SchemaError::InvalidControl {
        control: kind.as_str(),
        name: name.to_string(),
        model: model.to_string(),
        reason: reason.to_string(),
    };

    let Some((len, data_type)) = present.next() else {
        return Err(invalid("expects one of int32_false_true, fp32_false_true or bool_false_true"));
    };
    if present.next().is_some() {
        return Err(invalid("only one false/true table may be specified"));
    }
    if *len != 2 {
        return Err(invalid("false/true table must have exactly 2 entries"));
    }
    Ok(*data_type)
}

fn validate_typed_control(
    kind: ControlKind,
    name: &str,
    control: &Control,
    model: &str,
) -> Result<DataType, SchemaError> {
    let invalid = |reason: String| SchemaError::InvalidControl {
        control: kind.as_str(),
        name: name.to_string(),
        model: model.to_string(),
        reason,
    };
    let declared = control
        .data_type
        .as_deref()
        .ok_or_else(|| invalid("data_type is required".to_string()))?;
    match DataType::from_config_str(declared) {
        Some(
            data_type @ (DataType::Uint64
            | DataType::Int64
            | DataType::Uint32
            | DataType::Int32
            | DataType::Bytes),
        ) => Ok(data_type),
        _ => Err(invalid(format!("unsupported data_type {}", declared))),
    }
}
