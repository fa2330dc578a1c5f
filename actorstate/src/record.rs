//! Static record metadata.
//!
//! A [`RecordModel`] describes the properties of a stored record type: their
//! names, kinds, whether they are publicly readable, and which of them the
//! store treats as primary key or concurrency token. Conventions resolve
//! properties by name against the model once, at setup, and keep the
//! resulting typed accessors; nothing is looked up by name per call.
//!
//! Models are usually produced by `#[derive(Record)]`, but can be written by
//! hand with [`RecordModel::builder`].

use std::{borrow::Cow, fmt, sync::Arc};

use uuid::Uuid;

/// A type whose instances are persisted as records.
pub trait Record: Clone + Send + Sync + 'static {
    fn model() -> &'static RecordModel<Self>;
}

pub type Reader<R> = Arc<dyn for<'a> Fn(&'a R) -> Value<'a> + Send + Sync>;
pub type Writer<R> = Arc<dyn Fn(&mut R, Value<'static>) -> bool + Send + Sync>;

/// Property metadata of a record type.
pub struct RecordModel<R> {
    name: &'static str,
    properties: Vec<Property<R>>,
    primary_key: Vec<&'static str>,
}

pub struct RecordModelBuilder<R> {
    name: &'static str,
    properties: Vec<Property<R>>,
    primary_key: Vec<&'static str>,
}

/// A single readable (and writable) field of a record.
pub struct Property<R> {
    name: &'static str,
    kind: PropertyKind,
    nullable: bool,
    type_name: &'static str,
    readable: bool,
    concurrency_token: bool,
    read: Reader<R>,
    write: Writer<R>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyKind {
    Bool,
    Int { bits: u8 },
    UInt { bits: u8 },
    Float { bits: u8 },
    Uuid,
    String,
    Bytes,
}

/// A borrowed view of a property value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value<'a> {
    Null,
    Bool(bool),
    Integer(i64),
    Unsigned(u64),
    Float(f64),
    Uuid(Uuid),
    Str(Cow<'a, str>),
    Bytes(Cow<'a, [u8]>),
}

/// Conversion between a field type and [`Value`].
pub trait PropertyValue: Sized + 'static {
    const KIND: PropertyKind;
    const NULLABLE: bool = false;

    fn to_value(&self) -> Value<'_>;

    fn from_value(value: Value<'static>) -> Option<Self>;
}

// Implementations

impl<R: 'static> RecordModel<R> {
    pub fn builder(name: &'static str) -> RecordModelBuilder<R> {
        RecordModelBuilder {
            name,
            properties: Vec::new(),
            primary_key: Vec::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn properties(&self) -> &[Property<R>] {
        &self.properties
    }

    pub fn property(&self, name: &str) -> Option<&Property<R>> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Properties forming the store's primary key, in declaration order.
    pub fn primary_key(&self) -> &[&'static str] {
        &self.primary_key
    }

    pub fn concurrency_tokens(&self) -> impl Iterator<Item = &Property<R>> {
        self.properties.iter().filter(|p| p.concurrency_token)
    }

    /// Values of all properties, keyed by property name.
    pub fn values<'a>(&self, record: &'a R) -> Vec<(&'static str, Value<'a>)> {
        self.properties
            .iter()
            .map(|p| (p.name, p.read(record)))
            .collect()
    }
}

impl<R> fmt::Debug for RecordModel<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordModel")
            .field("name", &self.name)
            .field("properties", &self.properties)
            .field("primary_key", &self.primary_key)
            .finish()
    }
}

impl<R: 'static> RecordModelBuilder<R> {
    pub fn property(mut self, property: Property<R>) -> Self {
        self.properties.push(property);
        self
    }

    pub fn primary_key<I>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = &'static str>,
    {
        self.primary_key = names.into_iter().collect();
        self
    }

    /// Without an explicit primary key, a property called `id` is used.
    pub fn build(self) -> RecordModel<R> {
        let primary_key = if self.primary_key.is_empty() {
            self.properties
                .iter()
                .filter(|p| p.name == "id")
                .map(|p| p.name)
                .collect()
        } else {
            self.primary_key
        };

        RecordModel {
            name: self.name,
            properties: self.properties,
            primary_key,
        }
    }
}

impl<R: 'static> Property<R> {
    pub fn new<T: PropertyValue>(
        name: &'static str,
        get: fn(&R) -> &T,
        get_mut: fn(&mut R) -> &mut T,
    ) -> Self {
        Self {
            name,
            kind: T::KIND,
            nullable: T::NULLABLE,
            type_name: std::any::type_name::<T>(),
            readable: true,
            concurrency_token: false,
            read: reader(move |record| get(record).to_value()),
            write: Arc::new(move |record: &mut R, value| match T::from_value(value) {
                Some(value) => {
                    *get_mut(record) = value;
                    true
                }
                None => false,
            }),
        }
    }

    /// Marks the property as not publicly readable.
    pub fn private(mut self) -> Self {
        self.readable = false;
        self
    }

    /// Marks the property as checked for optimistic concurrency by the store.
    pub fn concurrency_token(mut self) -> Self {
        self.concurrency_token = true;
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn kind(&self) -> PropertyKind {
        self.kind
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn is_readable(&self) -> bool {
        self.readable
    }

    pub fn is_concurrency_token(&self) -> bool {
        self.concurrency_token
    }

    pub fn read<'a>(&self, record: &'a R) -> Value<'a> {
        (self.read)(record)
    }

    pub fn write(&self, record: &mut R, value: Value<'static>) -> bool {
        (self.write)(record, value)
    }

    pub fn reader(&self) -> Reader<R> {
        self.read.clone()
    }
}

impl<R> fmt::Debug for Property<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Property")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("nullable", &self.nullable)
            .field("type_name", &self.type_name)
            .field("readable", &self.readable)
            .field("concurrency_token", &self.concurrency_token)
            .finish()
    }
}

impl Value<'_> {
    /// Whether the value is its type's default: null, false, zero, nil UUID,
    /// empty string or empty byte sequence.
    pub fn is_default(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Bool(b) => !b,
            Value::Integer(i) => *i == 0,
            Value::Unsigned(u) => *u == 0,
            Value::Float(f) => *f == 0.0,
            Value::Uuid(u) => u.is_nil(),
            Value::Str(s) => s.is_empty(),
            Value::Bytes(b) => b.is_empty(),
        }
    }

    /// Canonical string form: bytes as uppercase hex, null as `None`,
    /// everything else in its display form.
    pub fn render(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Bytes(bytes) => Some(to_upper_hex(bytes)),
            Value::Bool(b) => Some(b.to_string()),
            Value::Integer(i) => Some(i.to_string()),
            Value::Unsigned(u) => Some(u.to_string()),
            Value::Float(f) => Some(f.to_string()),
            Value::Uuid(u) => Some(u.to_string()),
            Value::Str(s) => Some(s.to_string()),
        }
    }

    pub fn into_owned(self) -> Value<'static> {
        match self {
            Value::Null => Value::Null,
            Value::Bool(b) => Value::Bool(b),
            Value::Integer(i) => Value::Integer(i),
            Value::Unsigned(u) => Value::Unsigned(u),
            Value::Float(f) => Value::Float(f),
            Value::Uuid(u) => Value::Uuid(u),
            Value::Str(s) => Value::Str(Cow::Owned(s.into_owned())),
            Value::Bytes(b) => Value::Bytes(Cow::Owned(b.into_owned())),
        }
    }
}

impl fmt::Display for Value<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.render() {
            Some(s) => f.write_str(&s),
            None => f.write_str("null"),
        }
    }
}

fn reader<R, F>(f: F) -> Reader<R>
where
    F: for<'a> Fn(&'a R) -> Value<'a> + Send + Sync + 'static,
{
    Arc::new(f)
}

pub(crate) fn to_upper_hex(bytes: &[u8]) -> String {
    use std::fmt::Write;

    let mut hex = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(hex, "{byte:02X}");
    }
    hex
}

macro_rules! impl_signed {
    ($($ty:ty => $bits:expr),*) => {$(
        impl PropertyValue for $ty {
            const KIND: PropertyKind = PropertyKind::Int { bits: $bits };

            fn to_value(&self) -> Value<'_> {
                Value::Integer(*self as i64)
            }

            fn from_value(value: Value<'static>) -> Option<Self> {
                match value {
                    Value::Integer(i) => <$ty>::try_from(i).ok(),
                    Value::Unsigned(u) => <$ty>::try_from(u).ok(),
                    _ => None,
                }
            }
        }
    )*};
}

macro_rules! impl_unsigned {
    ($($ty:ty => $bits:expr),*) => {$(
        impl PropertyValue for $ty {
            const KIND: PropertyKind = PropertyKind::UInt { bits: $bits };

            fn to_value(&self) -> Value<'_> {
                Value::Unsigned(*self as u64)
            }

            fn from_value(value: Value<'static>) -> Option<Self> {
                match value {
                    Value::Unsigned(u) => <$ty>::try_from(u).ok(),
                    Value::Integer(i) => <$ty>::try_from(i).ok(),
                    _ => None,
                }
            }
        }
    )*};
}

impl_signed!(i8 => 8, i16 => 16, i32 => 32, i64 => 64);
impl_unsigned!(u8 => 8, u16 => 16, u32 => 32, u64 => 64);

impl PropertyValue for bool {
    const KIND: PropertyKind = PropertyKind::Bool;

    fn to_value(&self) -> Value<'_> {
        Value::Bool(*self)
    }

    fn from_value(value: Value<'static>) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(b),
            _ => None,
        }
    }
}

impl PropertyValue for f32 {
    const KIND: PropertyKind = PropertyKind::Float { bits: 32 };

    fn to_value(&self) -> Value<'_> {
        Value::Float(*self as f64)
    }

    fn from_value(value: Value<'static>) -> Option<Self> {
        match value {
            Value::Float(f) => Some(f as f32),
            _ => None,
        }
    }
}

impl PropertyValue for f64 {
    const KIND: PropertyKind = PropertyKind::Float { bits: 64 };

    fn to_value(&self) -> Value<'_> {
        Value::Float(*self)
    }

    fn from_value(value: Value<'static>) -> Option<Self> {
        match value {
            Value::Float(f) => Some(f),
            _ => None,
        }
    }
}

impl PropertyValue for Uuid {
    const KIND: PropertyKind = PropertyKind::Uuid;

    fn to_value(&self) -> Value<'_> {
        Value::Uuid(*self)
    }

    fn from_value(value: Value<'static>) -> Option<Self> {
        match value {
            Value::Uuid(u) => Some(u),
            _ => None,
        }
    }
}

impl PropertyValue for String {
    const KIND: PropertyKind = PropertyKind::String;

    fn to_value(&self) -> Value<'_> {
        Value::Str(Cow::Borrowed(self.as_str()))
    }

    fn from_value(value: Value<'static>) -> Option<Self> {
        match value {
            Value::Str(s) => Some(s.into_owned()),
            _ => None,
        }
    }
}

impl PropertyValue for Vec<u8> {
    const KIND: PropertyKind = PropertyKind::Bytes;

    fn to_value(&self) -> Value<'_> {
        Value::Bytes(Cow::Borrowed(self.as_slice()))
    }

    fn from_value(value: Value<'static>) -> Option<Self> {
        match value {
            Value::Bytes(b) => Some(b.into_owned()),
            _ => None,
        }
    }
}

impl<T: PropertyValue> PropertyValue for Option<T> {
    const KIND: PropertyKind = T::KIND;
    const NULLABLE: bool = true;

    fn to_value(&self) -> Value<'_> {
        match self {
            Some(value) => value.to_value(),
            None => Value::Null,
        }
    }

    fn from_value(value: Value<'static>) -> Option<Self> {
        match value {
            Value::Null => Some(None),
            value => T::from_value(value).map(Some),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::LazyLock;

    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Sample {
        id: i64,
        name: Option<String>,
        version: Vec<u8>,
        secret: u32,
    }

    impl Record for Sample {
        fn model() -> &'static RecordModel<Self> {
            static MODEL: LazyLock<RecordModel<Sample>> = LazyLock::new(|| {
                RecordModel::builder("Sample")
                    .property(Property::new("id", |r: &Sample| &r.id, |r| &mut r.id))
                    .property(Property::new("name", |r: &Sample| &r.name, |r| &mut r.name))
                    .property(
                        Property::new("version", |r: &Sample| &r.version, |r| &mut r.version)
                            .concurrency_token(),
                    )
                    .property(
                        Property::new("secret", |r: &Sample| &r.secret, |r| &mut r.secret)
                            .private(),
                    )
                    .build()
            });

            &MODEL
        }
    }

    fn sample() -> Sample {
        Sample {
            id: 3,
            name: None,
            version: vec![0x00, 0xAB, 0x10],
            secret: 9,
        }
    }

    #[test]
    fn test_model_lookup_and_defaults() {
        let model = Sample::model();

        assert_eq!(model.name(), "Sample");
        assert_eq!(model.primary_key(), &["id"]);
        assert!(model.property("missing").is_none());

        let name = model.property("name").unwrap();
        assert_eq!(name.kind(), PropertyKind::String);
        assert!(name.is_nullable());

        let id = model.property("id").unwrap();
        assert_eq!(id.kind(), PropertyKind::Int { bits: 64 });
        assert!(!id.is_nullable());

        assert!(!model.property("secret").unwrap().is_readable());

        let tokens: Vec<_> = model.concurrency_tokens().map(|p| p.name()).collect();
        assert_eq!(tokens, vec!["version"]);
    }

    #[test]
    fn test_read_and_write_through_property() {
        let model = Sample::model();
        let mut record = sample();

        assert_eq!(model.property("id").unwrap().read(&record), Value::Integer(3));
        assert_eq!(model.property("name").unwrap().read(&record), Value::Null);

        let name = model.property("name").unwrap();
        assert!(name.write(&mut record, Value::Str("x".into())));
        assert_eq!(record.name.as_deref(), Some("x"));

        // Kind mismatch leaves the record untouched
        assert!(!name.write(&mut record, Value::Integer(1)));
        assert_eq!(record.name.as_deref(), Some("x"));
    }

    #[test]
    fn test_value_default_and_render() {
        assert!(Value::Null.is_default());
        assert!(Value::Integer(0).is_default());
        assert!(Value::Uuid(Uuid::nil()).is_default());
        assert!(Value::Str("".into()).is_default());
        assert!(!Value::Str("a".into()).is_default());
        assert!(!Value::Unsigned(7).is_default());

        assert_eq!(Value::Null.render(), None);
        assert_eq!(
            Value::Bytes(Cow::Borrowed(&[0x00, 0xAB, 0x10])).render().as_deref(),
            Some("00AB10")
        );
        assert_eq!(Value::Integer(-4).render().as_deref(), Some("-4"));
    }

    #[test]
    fn test_narrow_integer_conversion() {
        assert_eq!(<u8 as PropertyValue>::from_value(Value::Integer(300)), None);
        assert_eq!(<i32 as PropertyValue>::from_value(Value::Unsigned(12)), Some(12));
        assert_eq!(
            <Option<i64> as PropertyValue>::from_value(Value::Null),
            Some(None)
        );
    }
}
