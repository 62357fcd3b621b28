//! Client uniform values and reflected uniform paths

use std::collections::HashMap;

use crate::foundation::collections::TextureKey;
use crate::foundation::math::{Mat3, Mat4, Vec2, Vec3, Vec4};
use crate::render::api::UniformData;

/// Where a reflected uniform's value lives among the client values
///
/// Parsed once when the program links. `lights[2].color` becomes
/// `IndexedMember`, `material.shininess` becomes `Member`, and both `time`
/// and `weights[0]` become `Plain` (arrays are supplied whole).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum UniformPath {
    /// Top-level value
    Plain(String),
    /// Field of a struct uniform
    Member {
        /// Struct uniform name
        base: String,
        /// Field name
        member: String,
    },
    /// Field of one element of a struct-array uniform
    IndexedMember {
        /// Array uniform name
        base: String,
        /// Element index
        index: usize,
        /// Field name
        member: String,
    },
}

impl UniformPath {
    /// Parse a reflected uniform name
    pub fn parse(name: &str) -> Self {
        let tokens: Vec<&str> = name
            .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .filter(|token| !token.is_empty())
            .collect();

        match tokens.as_slice() {
            [base, index, member] => match index.parse() {
                Ok(index) => Self::IndexedMember {
                    base: (*base).to_string(),
                    index,
                    member: (*member).to_string(),
                },
                Err(_) => Self::Plain((*base).to_string()),
            },
            [base, member] if member.parse::<f64>().is_err() => Self::Member {
                base: (*base).to_string(),
                member: (*member).to_string(),
            },
            [base, ..] => Self::Plain((*base).to_string()),
            [] => Self::Plain(name.to_string()),
        }
    }

    /// Top-level uniform name
    pub fn base(&self) -> &str {
        match self {
            Self::Plain(base) | Self::Member { base, .. } | Self::IndexedMember { base, .. } => base,
        }
    }
}

impl std::fmt::Display for UniformPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Plain(base) => write!(f, "{}", base),
            Self::Member { base, member } => write!(f, "{}.{}", base, member),
            Self::IndexedMember { base, index, member } => write!(f, "{}[{}].{}", base, index, member),
        }
    }
}

/// A single client uniform value
#[derive(Debug, Clone, PartialEq)]
pub enum UniformValue {
    /// `float`
    Float(f32),
    /// `int`
    Int(i32),
    /// `bool`
    Bool(bool),
    /// `vec2`
    Vec2(Vec2),
    /// `vec3`
    Vec3(Vec3),
    /// `vec4`
    Vec4(Vec4),
    /// `mat3`
    Mat3(Mat3),
    /// `mat4`
    Mat4(Mat4),
    /// `float[]` or any pre-flattened float data
    Floats(Vec<f32>),
    /// `int[]`
    Ints(Vec<i32>),
    /// `vec3[]`
    Vec3s(Vec<Vec3>),
    /// `mat4[]`
    Mat4s(Vec<Mat4>),
    /// `sampler2D`
    Texture(TextureKey),
    /// `sampler2D[]`
    Textures(Vec<TextureKey>),
}

impl UniformValue {
    /// Device payload for this value
    ///
    /// Arrays of vectors and matrices are flattened into `scratch`. Texture
    /// values have no payload of their own; their units are assigned when the
    /// program is used.
    pub fn data<'a>(&'a self, scratch: &'a mut UniformScratch) -> Option<UniformData<'a>> {
        Some(match self {
            Self::Float(v) => UniformData::Float(*v),
            Self::Int(v) => UniformData::Int(*v),
            Self::Bool(v) => UniformData::Int(i32::from(*v)),
            Self::Vec2(v) => UniformData::Floats(v.as_slice()),
            Self::Vec3(v) => UniformData::Floats(v.as_slice()),
            Self::Vec4(v) => UniformData::Floats(v.as_slice()),
            Self::Mat3(m) => UniformData::Floats(m.as_slice()),
            Self::Mat4(m) => UniformData::Floats(m.as_slice()),
            Self::Floats(values) => UniformData::Floats(values),
            Self::Ints(values) => UniformData::Ints(values),
            Self::Vec3s(values) => {
                scratch.floats.clear();
                values.iter().for_each(|v| scratch.floats.extend_from_slice(v.as_slice()));
                UniformData::Floats(&scratch.floats)
            }
            Self::Mat4s(values) => {
                scratch.floats.clear();
                values.iter().for_each(|m| scratch.floats.extend_from_slice(m.as_slice()));
                UniformData::Floats(&scratch.floats)
            }
            Self::Texture(_) | Self::Textures(_) => return None,
        })
    }
}

macro_rules! impl_from_uniform_value {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for UniformValue {
                fn from(value: $ty) -> Self {
                    Self::$variant(value)
                }
            }

            impl From<$ty> for Uniform {
                fn from(value: $ty) -> Self {
                    Self::Value(UniformValue::$variant(value))
                }
            }
        )*
    };
}

impl_from_uniform_value! {
    f32 => Float,
    i32 => Int,
    bool => Bool,
    Vec2 => Vec2,
    Vec3 => Vec3,
    Vec4 => Vec4,
    Mat3 => Mat3,
    Mat4 => Mat4,
    Vec<f32> => Floats,
    Vec<i32> => Ints,
    Vec<Vec3> => Vec3s,
    Vec<Mat4> => Mat4s,
    TextureKey => Texture,
    Vec<TextureKey> => Textures,
}

/// A named client uniform: a plain value, a struct, or an array of structs
#[derive(Debug, Clone, PartialEq)]
pub enum Uniform {
    /// Plain value
    Value(UniformValue),
    /// Struct fields by name
    Struct(HashMap<String, UniformValue>),
    /// Array of structs
    StructArray(Vec<HashMap<String, UniformValue>>),
}

impl Uniform {
    /// Build a struct uniform from `(field, value)` pairs
    pub fn structure<K, V>(fields: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<UniformValue>,
    {
        Self::Struct(fields.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }

    /// Follow a parsed path below this uniform (the base name already matched)
    pub fn resolve(&self, path: &UniformPath) -> Option<&UniformValue> {
        match (self, path) {
            (Self::Value(value), UniformPath::Plain(_)) => Some(value),
            (Self::Struct(fields), UniformPath::Member { member, .. }) => fields.get(member),
            (Self::StructArray(items), UniformPath::IndexedMember { index, member, .. }) => {
                items.get(*index).and_then(|fields| fields.get(member))
            }
            _ => None,
        }
    }
}

impl From<UniformValue> for Uniform {
    fn from(value: UniformValue) -> Self {
        Self::Value(value)
    }
}

/// Reusable buffers for flattened uniform data
#[derive(Debug, Default)]
pub struct UniformScratch {
    /// Flattened float components
    pub floats: Vec<f32>,
    /// Texture units or other integer lists
    pub ints: Vec<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_uniform_paths() {
        assert_eq!(UniformPath::parse("time"), UniformPath::Plain("time".into()));
        assert_eq!(UniformPath::parse("weights[0]"), UniformPath::Plain("weights".into()));
        assert_eq!(
            UniformPath::parse("material.shininess"),
            UniformPath::Member { base: "material".into(), member: "shininess".into() }
        );
        assert_eq!(
            UniformPath::parse("lights[2].color"),
            UniformPath::IndexedMember { base: "lights".into(), index: 2, member: "color".into() }
        );
    }

    #[test]
    fn test_path_display_round_trips_reflected_name() {
        for name in ["time", "material.shininess", "lights[2].color"] {
            assert_eq!(UniformPath::parse(name).to_string(), name);
        }
    }

    #[test]
    fn test_resolve_struct_array_member() {
        let light = |intensity: f32| {
            let mut fields = HashMap::new();
            fields.insert("intensity".to_string(), UniformValue::Float(intensity));
            fields
        };
        let uniform = Uniform::StructArray(vec![light(0.5), light(2.0)]);

        let path = UniformPath::parse("lights[1].intensity");
        assert_eq!(uniform.resolve(&path), Some(&UniformValue::Float(2.0)));

        let missing = UniformPath::parse("lights[5].intensity");
        assert_eq!(uniform.resolve(&missing), None);
        assert_eq!(uniform.resolve(&UniformPath::parse("lights")), None);
    }

    #[test]
    fn test_flatten_vector_array_into_scratch() {
        let mut scratch = UniformScratch::default();
        let value = UniformValue::Vec3s(vec![Vec3::new(1.0, 2.0, 3.0), Vec3::new(4.0, 5.0, 6.0)]);

        match value.data(&mut scratch) {
            Some(UniformData::Floats(values)) => assert_eq!(values, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]),
            other => panic!("unexpected payload {:?}", other),
        }
        assert!(UniformValue::Texture(TextureKey::default()).data(&mut scratch).is_none());
    }
}
