//! GLSL declaration scanner
//!
//! Recovers the interface a GL driver would report after linking: active
//! uniforms (with arrays reported as `name[0]` and struct uniforms expanded to
//! `name.member` / `name[i].member`) and vertex attributes with their
//! locations. Only top-level declarations are inspected; function bodies and
//! parameter lists are skipped.

use std::collections::HashMap;

use crate::render::api::{ActiveUniform, ShaderStage, UniformType};

/// Reflected program interface
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShaderInterface {
    /// Active uniforms in declaration order, vertex stage first
    pub uniforms: Vec<ActiveUniform>,
    /// Attribute names with their locations, in declaration order
    pub attributes: Vec<(String, u32)>,
}

impl ShaderInterface {
    /// Location of a uniform by reflected name, also accepting `name` for `name[0]`
    pub fn uniform_index(&self, name: &str) -> Option<usize> {
        self.uniforms.iter().position(|uniform| {
            uniform.name == name
                || uniform
                    .name
                    .strip_suffix("[0]")
                    .is_some_and(|base| base == name)
        })
    }

    /// Location of an attribute by name
    pub fn attribute_location(&self, name: &str) -> Option<u32> {
        self.attributes
            .iter()
            .find(|(attribute, _)| attribute == name)
            .map(|(_, location)| *location)
    }
}

/// Reflect a vertex/fragment pair
pub fn reflect(vertex: &str, fragment: &str) -> ShaderInterface {
    let vertex = scan(vertex, ShaderStage::Vertex);
    let fragment = scan(fragment, ShaderStage::Fragment);

    let mut uniforms = Vec::new();
    for (decls, structs) in [(&vertex.uniforms, &vertex.structs), (&fragment.uniforms, &fragment.structs)] {
        let mut expanded = Vec::new();
        for decl in decls {
            expand_uniform(decl, structs, "", &mut expanded);
        }
        for uniform in expanded {
            if !uniforms.iter().any(|u: &ActiveUniform| u.name == uniform.name) {
                uniforms.push(uniform);
            }
        }
    }

    let mut used: Vec<u32> = vertex.inputs.iter().filter_map(|(_, location)| *location).collect();
    let mut attributes = Vec::with_capacity(vertex.inputs.len());
    for (decl, explicit) in &vertex.inputs {
        let location = explicit.unwrap_or_else(|| {
            let mut next = 0;
            while used.contains(&next) {
                next += 1;
            }
            used.push(next);
            next
        });
        attributes.push((decl.name.clone(), location));
    }

    ShaderInterface { uniforms, attributes }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Ident(String),
    Number(String),
    Punct(char),
}

#[derive(Debug, Clone)]
struct Decl {
    ty: String,
    name: String,
    array: Option<usize>,
}

#[derive(Debug, Default)]
struct Declarations {
    structs: HashMap<String, Vec<Decl>>,
    uniforms: Vec<Decl>,
    inputs: Vec<(Decl, Option<u32>)>,
}

const QUALIFIERS: &[&str] = &[
    "lowp", "mediump", "highp", "flat", "smooth", "noperspective", "centroid", "const", "invariant",
];

fn strip_comments(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut chars = source.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '/' && chars.peek() == Some(&'/') {
            for next in chars.by_ref() {
                if next == '\n' {
                    out.push('\n');
                    break;
                }
            }
        } else if c == '/' && chars.peek() == Some(&'*') {
            chars.next();
            let mut prev = '\0';
            for next in chars.by_ref() {
                if prev == '*' && next == '/' {
                    break;
                }
                prev = next;
            }
            out.push(' ');
        } else {
            out.push(c);
        }
    }

    out.lines()
        .filter(|line| !line.trim_start().starts_with('#'))
        .collect::<Vec<_>>()
        .join("\n")
}

fn tokenize(source: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = source.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if c.is_ascii_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            tokens.push(Token::Ident(chars[start..i].iter().collect()));
        } else if c.is_ascii_digit() {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '.') {
                i += 1;
            }
            tokens.push(Token::Number(chars[start..i].iter().collect()));
        } else {
            tokens.push(Token::Punct(c));
            i += 1;
        }
    }
    tokens
}

struct Cursor {
    tokens: Vec<Token>,
    pos: usize,
}

impl Cursor {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn is_punct(&self, c: char) -> bool {
        self.peek() == Some(&Token::Punct(c))
    }

    fn ident(&mut self) -> Option<String> {
        match self.peek() {
            Some(Token::Ident(name)) => {
                let name = name.clone();
                self.pos += 1;
                Some(name)
            }
            _ => None,
        }
    }

    fn skip_qualifiers(&mut self) {
        while let Some(Token::Ident(word)) = self.peek() {
            if QUALIFIERS.contains(&word.as_str()) {
                self.pos += 1;
            } else {
                break;
            }
        }
    }

    fn skip_past(&mut self, c: char) {
        while let Some(token) = self.next() {
            if token == Token::Punct(c) {
                break;
            }
        }
    }

    fn skip_block(&mut self) {
        let mut depth = 0usize;
        while let Some(token) = self.next() {
            match token {
                Token::Punct('{') => depth += 1,
                Token::Punct('}') => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        break;
                    }
                }
                _ => {}
            }
        }
    }

    /// `name [N] (, name [N])* ;` following an already consumed type
    fn declarators(&mut self, ty: &str) -> Vec<Decl> {
        let mut decls = Vec::new();
        while let Some(name) = self.ident() {
            let mut array = None;
            if self.is_punct('[') {
                self.pos += 1;
                array = match self.next() {
                    Some(Token::Number(n)) => n.trim_end_matches(|c| c == 'u' || c == 'U').parse().ok().or(Some(1)),
                    _ => Some(1),
                };
                self.skip_past(']');
            }
            decls.push(Decl { ty: ty.to_string(), name, array });
            if self.is_punct(',') {
                self.pos += 1;
            } else {
                break;
            }
        }
        self.skip_past(';');
        decls
    }

    fn layout_location(&mut self) -> Option<u32> {
        if !self.is_punct('(') {
            return None;
        }
        self.pos += 1;
        let mut location = None;
        while let Some(token) = self.next() {
            match token {
                Token::Punct(')') => break,
                Token::Ident(word) if word == "location" => {
                    if self.is_punct('=') {
                        self.pos += 1;
                        if let Some(Token::Number(n)) = self.next() {
                            location = n.parse().ok();
                        }
                    }
                }
                _ => {}
            }
        }
        location
    }
}

fn scan(source: &str, stage: ShaderStage) -> Declarations {
    let mut cursor = Cursor { tokens: tokenize(&strip_comments(source)), pos: 0 };
    let mut decls = Declarations::default();
    let mut braces = 0usize;
    let mut parens = 0usize;
    let mut location = None;

    while let Some(token) = cursor.next() {
        match token {
            Token::Punct('{') => braces += 1,
            Token::Punct('}') => braces = braces.saturating_sub(1),
            Token::Punct('(') => parens += 1,
            Token::Punct(')') => parens = parens.saturating_sub(1),
            Token::Punct(';') => location = None,
            _ if braces > 0 || parens > 0 => {}
            Token::Ident(word) => match word.as_str() {
                "struct" => {
                    let Some(name) = cursor.ident() else { continue };
                    if !cursor.is_punct('{') {
                        continue;
                    }
                    cursor.pos += 1;
                    let mut members = Vec::new();
                    while !cursor.is_punct('}') && cursor.peek().is_some() {
                        cursor.skip_qualifiers();
                        match cursor.ident() {
                            Some(ty) => members.extend(cursor.declarators(&ty)),
                            None => {
                                cursor.pos += 1;
                            }
                        }
                    }
                    cursor.skip_past(';');
                    decls.structs.insert(name, members);
                }
                "layout" => location = cursor.layout_location(),
                "uniform" => {
                    cursor.skip_qualifiers();
                    let Some(ty) = cursor.ident() else { continue };
                    if cursor.is_punct('{') {
                        cursor.skip_block();
                        cursor.skip_past(';');
                    } else {
                        decls.uniforms.extend(cursor.declarators(&ty));
                    }
                    location = None;
                }
                "attribute" | "in" if stage == ShaderStage::Vertex => {
                    cursor.skip_qualifiers();
                    let Some(ty) = cursor.ident() else { continue };
                    let explicit = location.take();
                    for (i, decl) in cursor.declarators(&ty).into_iter().enumerate() {
                        let explicit = explicit.map(|base| base + i as u32);
                        decls.inputs.push((decl, explicit));
                    }
                }
                _ => {}
            },
            Token::Number(_) | Token::Punct(_) => {}
        }
    }

    decls
}

fn expand_uniform(decl: &Decl, structs: &HashMap<String, Vec<Decl>>, prefix: &str, out: &mut Vec<ActiveUniform>) {
    if let Some(utype) = UniformType::from_glsl(&decl.ty) {
        match decl.array {
            Some(size) => out.push(ActiveUniform {
                name: format!("{prefix}{}[0]", decl.name),
                utype,
                size: size as i32,
            }),
            None => out.push(ActiveUniform {
                name: format!("{prefix}{}", decl.name),
                utype,
                size: 1,
            }),
        }
    } else if let Some(members) = structs.get(&decl.ty) {
        match decl.array {
            Some(size) => {
                for index in 0..size {
                    let nested = format!("{prefix}{}[{index}].", decl.name);
                    for member in members {
                        expand_uniform(member, structs, &nested, out);
                    }
                }
            }
            None => {
                let nested = format!("{prefix}{}.", decl.name);
                for member in members {
                    expand_uniform(member, structs, &nested, out);
                }
            }
        }
    } else {
        log::trace!("Skipping uniform {} of unknown type {}", decl.name, decl.ty);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VERTEX: &str = r"
        #version 300 es
        precision highp float;
        // comment with uniform float ignored;
        layout(location = 2) in vec2 uv;
        in vec3 position;
        in vec3 normal;
        uniform mat4 modelViewMatrix;
        uniform mat4 projectionMatrix;
        /* uniform vec3 hidden; */
        out vec2 vUv;
        vec3 helper(in vec3 p) { return p; }
        void main() {
            vUv = uv;
            gl_Position = projectionMatrix * modelViewMatrix * vec4(helper(position), 1.0);
        }
    ";

    const FRAGMENT: &str = r"
        #version 300 es
        precision highp float;
        struct Light {
            vec3 color;
            float intensity;
        };
        uniform Light lights[2];
        uniform Light sun;
        uniform float weights[4];
        uniform sampler2D tMap;
        uniform mat4 projectionMatrix;
        in vec2 vUv;
        out vec4 color;
        void main() { color = texture(tMap, vUv); }
    ";

    fn names(interface: &ShaderInterface) -> Vec<&str> {
        interface.uniforms.iter().map(|u| u.name.as_str()).collect()
    }

    #[test]
    fn test_reflects_uniforms_across_stages() {
        let interface = reflect(VERTEX, FRAGMENT);

        assert_eq!(
            names(&interface),
            vec![
                "modelViewMatrix",
                "projectionMatrix",
                "lights[0].color",
                "lights[0].intensity",
                "lights[1].color",
                "lights[1].intensity",
                "sun.color",
                "sun.intensity",
                "weights[0]",
                "tMap",
            ]
        );
        let weights = &interface.uniforms[8];
        assert_eq!(weights.size, 4);
        assert_eq!(weights.utype, UniformType::Float);
    }

    #[test]
    fn test_attribute_locations_respect_layout() {
        let interface = reflect(VERTEX, FRAGMENT);

        assert_eq!(interface.attribute_location("uv"), Some(2));
        assert_eq!(interface.attribute_location("position"), Some(0));
        assert_eq!(interface.attribute_location("normal"), Some(1));
        assert_eq!(interface.attribute_location("vUv"), None);
        assert_eq!(interface.attribute_location("p"), None);
    }

    #[test]
    fn test_uniform_index_accepts_array_base_name() {
        let interface = reflect(VERTEX, FRAGMENT);
        assert_eq!(interface.uniform_index("weights"), interface.uniform_index("weights[0]"));
        assert!(interface.uniform_index("hidden").is_none());
    }

    #[test]
    fn test_legacy_attribute_keyword() {
        let interface = reflect(
            "attribute vec3 position; attribute vec2 uv; void main() {}",
            "void main() {}",
        );
        assert_eq!(
            interface.attributes,
            vec![("position".to_string(), 0), ("uv".to_string(), 1)]
        );
    }
}
