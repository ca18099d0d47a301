use serde_json::Value;
use strum::Display;

use super::{descriptor::ContentDescriptor, NormalizeError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Shape {
    Single,
    EventsList,
    Facets,
    Timeseries,
    FacetsTimeseries,
    Compare,
    CompareFacets,
    CompareTimeseries,
}

impl Shape {
    /// Compare dominates facets, facets dominate time series.
    fn from_flags(flags: Flags, ordered: bool) -> Self {
        match (flags.compare, flags.facets, flags.timeseries) {
            (false, false, false) if ordered => Shape::EventsList,
            (false, false, false) => Shape::Single,
            (false, false, true) => Shape::Timeseries,
            (false, true, false) => Shape::Facets,
            (false, true, true) => Shape::FacetsTimeseries,
            (true, true, _) => Shape::CompareFacets,
            (true, false, true) => Shape::CompareTimeseries,
            (true, false, false) => Shape::Compare,
        }
    }

    pub fn is_compare(&self) -> bool {
        matches!(
            self,
            Shape::Compare | Shape::CompareFacets | Shape::CompareTimeseries
        )
    }

    /// Shapes whose rows carry per-bucket timing fields.
    pub fn has_buckets(&self) -> bool {
        matches!(
            self,
            Shape::Timeseries | Shape::FacetsTimeseries | Shape::CompareTimeseries
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Flags {
    compare: bool,
    facets: bool,
    timeseries: bool,
}

impl Flags {
    /// Where the true contents list lives, relative to the metadata block.
    fn contents_path(&self) -> &'static [&'static str] {
        match (self.compare, self.facets, self.timeseries) {
            (false, false, false) => &["contents"],
            (false, false, true) => &["timeSeries", "contents"],
            (_, _, false) => &["contents", "contents"],
            (_, _, true) => &["contents", "timeSeries", "contents"],
        }
    }
}

/// Facet attribute name(s) declared by the query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FacetSpec {
    Single(String),
    Multiple(Vec<String>),
}

impl FacetSpec {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(name) => Some(FacetSpec::Single(name.to_owned())),
            Value::Array(names) => Some(FacetSpec::Multiple(
                names.iter().map(label).collect(),
            )),
            _ => None,
        }
    }

    pub fn names(&self) -> &[String] {
        match self {
            FacetSpec::Single(name) => std::slice::from_ref(name),
            FacetSpec::Multiple(names) => names,
        }
    }
}

/// The results collection of each shape, already located in the response.
#[derive(Debug, Clone, Copy)]
pub enum Source<'a> {
    Single(&'a [Value]),
    EventsList(&'a [Value]),
    Facets(&'a [Value]),
    Timeseries(&'a [Value]),
    FacetsTimeseries(&'a [Value]),
    Compare(Sides<'a>),
    CompareFacets(Sides<'a>),
    CompareTimeseries(Sides<'a>),
}

#[derive(Debug, Clone, Copy)]
pub struct Sides<'a> {
    pub current: &'a [Value],
    pub previous: &'a [Value],
}

impl<'a> Source<'a> {
    /// Every leaf result item, in response order. Used to discover the columns of
    /// functions whose arity is only known from the data.
    pub fn items(&self) -> Vec<&'a Value> {
        match *self {
            Source::Single(results) | Source::EventsList(results) => results.iter().collect(),
            Source::Facets(groups) | Source::Timeseries(groups) => {
                nested(groups, "results").collect()
            }
            Source::FacetsTimeseries(groups) => groups
                .iter()
                .flat_map(|group| list(group, "timeSeries"))
                .flat_map(|bucket| list(bucket, "results"))
                .collect(),
            Source::Compare(sides) => sides.current.iter().chain(sides.previous).collect(),
            Source::CompareFacets(sides) | Source::CompareTimeseries(sides) => {
                nested(sides.current, "results")
                    .chain(nested(sides.previous, "results"))
                    .collect()
            }
        }
    }
}

fn nested<'a>(values: &'a [Value], key: &'static str) -> impl Iterator<Item = &'a Value> + 'a {
    values.iter().flat_map(move |value| list(value, key))
}

/// The list stored under `key`, or nothing when absent.
pub(crate) fn list<'a>(value: &'a Value, key: &str) -> &'a [Value] {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

/// Text of a name that may arrive as a non-string JSON value.
pub(crate) fn label(value: &Value) -> String {
    match value {
        Value::String(name) => name.to_owned(),
        other => other.to_string(),
    }
}

#[derive(Debug)]
pub struct Classified<'a> {
    pub shape: Shape,
    pub metadata: &'a Value,
    pub contents: Vec<ContentDescriptor>,
    pub facet: Option<FacetSpec>,
    pub source: Source<'a>,
}

pub fn classify(response: &Value) -> Result<Classified<'_>, NormalizeError> {
    if !response.is_object() {
        return Err(NormalizeError::NoResponse);
    }
    let metadata = response
        .get("metadata")
        .ok_or(NormalizeError::MissingMetadata)?;
    let contents = metadata
        .get("contents")
        .ok_or(NormalizeError::MissingContents)?;

    let flags = Flags {
        compare: metadata.get("compareWith").is_some(),
        facets: metadata.get("facet").is_some() || contents.get("facet").is_some(),
        timeseries: metadata.get("timeSeries").is_some() || contents.get("timeSeries").is_some(),
    };

    let is_simple = !(flags.compare || flags.facets || flags.timeseries);
    let ordered = if is_simple {
        let first = contents
            .as_array()
            .and_then(|contents| contents.first())
            .ok_or(NormalizeError::NoContents)?;
        first.get("order").is_some()
    } else {
        false
    };
    let shape = Shape::from_flags(flags, ordered);

    let facet = if flags.facets {
        let (primary, secondary) = if flags.compare {
            (contents.get("facet"), metadata.get("facet"))
        } else {
            (metadata.get("facet"), contents.get("facet"))
        };
        primary.or(secondary).and_then(FacetSpec::from_value)
    } else {
        None
    };

    let contents = contents_list(metadata, flags)?
        .iter()
        .map(ContentDescriptor::from_value)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| NormalizeError::MalformedDescriptor(err.to_string()))?;

    let source = match shape {
        Shape::Single => Source::Single(results(response, "results")?),
        Shape::EventsList => Source::EventsList(results(response, "results")?),
        Shape::Facets => Source::Facets(results(response, "facets")?),
        Shape::FacetsTimeseries => Source::FacetsTimeseries(results(response, "facets")?),
        Shape::Timeseries => Source::Timeseries(results(response, "timeSeries")?),
        Shape::Compare => Source::Compare(sides(response, "results")?),
        Shape::CompareFacets => Source::CompareFacets(sides(response, "facets")?),
        Shape::CompareTimeseries => Source::CompareTimeseries(sides(response, "timeSeries")?),
    };

    Ok(Classified {
        shape,
        metadata,
        contents,
        facet,
        source,
    })
}

/// Follows the fixed unwrap path, then any further `contents` wrappers, down to a list.
fn contents_list(metadata: &Value, flags: Flags) -> Result<&Vec<Value>, NormalizeError> {
    let mut node = metadata;
    let mut path = String::from("metadata");

    for step in flags.contents_path() {
        path.push('.');
        path.push_str(step);
        node = node
            .get(step)
            .ok_or_else(|| NormalizeError::MissingPath(path.clone()))?;
    }

    while let Some(inner) = node.as_object().and_then(|object| object.get("contents")) {
        path.push_str(".contents");
        node = inner;
    }

    node.as_array().ok_or(NormalizeError::MissingPath(path))
}

fn results<'a>(value: &'a Value, key: &str) -> Result<&'a [Value], NormalizeError> {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .ok_or_else(|| NormalizeError::MissingResults(key.to_owned()))
}

fn sides<'a>(response: &'a Value, key: &str) -> Result<Sides<'a>, NormalizeError> {
    let current = response
        .get("current")
        .ok_or_else(|| NormalizeError::MissingResults("current".to_owned()))?;
    let previous = response
        .get("previous")
        .ok_or_else(|| NormalizeError::MissingResults("previous".to_owned()))?;
    Ok(Sides {
        current: results(current, key)?,
        previous: results(previous, key)?,
    })
}
