use std::{fmt::Debug, sync::Arc};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{AcmorphError, AcmorphResult};

/// The names of the scalar and array fields carried by every event of a source.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EventSchema {
    scalar_lookup: IndexMap<String, usize>,
    array_lookup: IndexMap<String, usize>,
}

impl EventSchema {
    /// Construct a schema from scalar and array field names. Names must be unique across both
    /// kinds of field.
    pub fn new<S: Into<String>, A: Into<String>>(
        scalar_names: Vec<S>,
        array_names: Vec<A>,
    ) -> AcmorphResult<Self> {
        let mut scalar_lookup = IndexMap::with_capacity(scalar_names.len());
        for (index, name) in scalar_names.into_iter().enumerate() {
            let name = name.into();
            if scalar_lookup.contains_key(&name) {
                return Err(AcmorphError::RegistrationError { name });
            }
            scalar_lookup.insert(name, index);
        }
        let mut array_lookup = IndexMap::with_capacity(array_names.len());
        for (index, name) in array_names.into_iter().enumerate() {
            let name = name.into();
            if scalar_lookup.contains_key(&name) || array_lookup.contains_key(&name) {
                return Err(AcmorphError::RegistrationError { name });
            }
            array_lookup.insert(name, index);
        }
        Ok(Self {
            scalar_lookup,
            array_lookup,
        })
    }
    /// Resolve the index of a scalar field by name.
    pub fn scalar_index(&self, name: &str) -> Option<usize> {
        self.scalar_lookup.get(name).copied()
    }
    /// Resolve the index of an array field by name.
    pub fn array_index(&self, name: &str) -> Option<usize> {
        self.array_lookup.get(name).copied()
    }
    /// Scalar field names in declaration order.
    pub fn scalar_names(&self) -> impl Iterator<Item = &str> {
        self.scalar_lookup.keys().map(|name| name.as_str())
    }
    /// Array field names in declaration order.
    pub fn array_names(&self) -> impl Iterator<Item = &str> {
        self.array_lookup.keys().map(|name| name.as_str())
    }
    /// Number of scalar fields.
    pub fn n_scalars(&self) -> usize {
        self.scalar_lookup.len()
    }
    /// Number of array fields.
    pub fn n_arrays(&self) -> usize {
        self.array_lookup.len()
    }
}

/// The values of one event, positionally matching an [`EventSchema`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EventData {
    /// Scalar field values
    pub scalars: Vec<f64>,
    /// Small fixed-length array field values (jet quantities and similar)
    pub arrays: Vec<Vec<f64>>,
}

impl EventData {
    /// Create a new event record.
    pub fn new(scalars: Vec<f64>, arrays: Vec<Vec<f64>>) -> Self {
        Self { scalars, arrays }
    }
}

/// A name-aware view of one event.
#[derive(Clone, Copy, Debug)]
pub struct Event<'a> {
    data: &'a EventData,
    schema: &'a EventSchema,
    index: usize,
}

impl<'a> Event<'a> {
    /// Attach a schema to a record. `index` is the position of the record in its source and is
    /// only used for error messages.
    pub fn new(data: &'a EventData, schema: &'a EventSchema, index: usize) -> Self {
        Self {
            data,
            schema,
            index,
        }
    }
    /// Position of this event in its source.
    pub fn index(&self) -> usize {
        self.index
    }
    /// The schema of this event.
    pub fn schema(&self) -> &'a EventSchema {
        self.schema
    }
    /// Retrieve a scalar field by name.
    pub fn scalar(&self, name: &str) -> Option<f64> {
        let index = self.schema.scalar_index(name)?;
        self.data.scalars.get(index).copied()
    }
    /// Retrieve an array field by name.
    pub fn array(&self, name: &str) -> Option<&'a [f64]> {
        let index = self.schema.array_index(name)?;
        self.data.arrays.get(index).map(|values| values.as_slice())
    }
    /// Retrieve a scalar field by name, failing if it does not exist.
    pub fn require_scalar(&self, name: &str) -> AcmorphResult<f64> {
        self.scalar(name).ok_or_else(|| AcmorphError::MissingFieldError {
            field: name.to_string(),
            event: self.index,
        })
    }
    /// Retrieve an array field by name, failing if it does not exist.
    pub fn require_array(&self, name: &str) -> AcmorphResult<&'a [f64]> {
        self.array(name).ok_or_else(|| AcmorphError::MissingFieldError {
            field: name.to_string(),
            event: self.index,
        })
    }
}

/// A restartable sequence of events with named fields.
///
/// Implementations decide the storage; the rest of the crate only relies on named-field access to
/// one event at a time. Each call to [`EventSource::for_each_event`] starts from the first event.
pub trait EventSource: Debug + Send + Sync {
    /// The field names of every event.
    fn schema(&self) -> &EventSchema;
    /// The number of events.
    fn len(&self) -> usize;
    /// Whether there are no events.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    /// Visit every event in order, stopping at the first error.
    fn for_each_event(
        &self,
        op: &mut dyn FnMut(&Event<'_>) -> AcmorphResult<()>,
    ) -> AcmorphResult<()>;
}

/// An in-memory [`EventSource`].
#[derive(Clone, Debug, Default)]
pub struct Dataset {
    schema: Arc<EventSchema>,
    events: Vec<EventData>,
}

impl Dataset {
    /// Create a dataset, checking that every record matches the schema.
    pub fn new(schema: Arc<EventSchema>, events: Vec<EventData>) -> AcmorphResult<Self> {
        let mut dataset = Self {
            schema,
            events: Vec::with_capacity(events.len()),
        };
        for event in events {
            dataset.push(event)?;
        }
        Ok(dataset)
    }
    /// Append a record, checking it against the schema.
    pub fn push(&mut self, event: EventData) -> AcmorphResult<()> {
        if event.scalars.len() != self.schema.n_scalars()
            || event.arrays.len() != self.schema.n_arrays()
        {
            return Err(AcmorphError::Custom(format!(
                "event {} has {} scalars and {} arrays but the schema declares {} and {}",
                self.events.len(),
                event.scalars.len(),
                event.arrays.len(),
                self.schema.n_scalars(),
                self.schema.n_arrays()
            )));
        }
        self.events.push(event);
        Ok(())
    }
    /// Get a view of one event.
    pub fn event(&self, index: usize) -> Option<Event<'_>> {
        self.events
            .get(index)
            .map(|data| Event::new(data, &self.schema, index))
    }
    /// Iterate over views of every event.
    pub fn iter(&self) -> impl Iterator<Item = Event<'_>> {
        self.events
            .iter()
            .enumerate()
            .map(|(index, data)| Event::new(data, &self.schema, index))
    }
    /// The shared schema.
    pub fn schema_arc(&self) -> Arc<EventSchema> {
        self.schema.clone()
    }
}

impl EventSource for Dataset {
    fn schema(&self) -> &EventSchema {
        &self.schema
    }
    fn len(&self) -> usize {
        self.events.len()
    }
    fn for_each_event(
        &self,
        op: &mut dyn FnMut(&Event<'_>) -> AcmorphResult<()>,
    ) -> AcmorphResult<()> {
        for event in self.iter() {
            op(&event)?;
        }
        Ok(())
    }
}
