//! Structural patching of the target's primary type
//!
//! The target never exposes its running server object. [`InstanceFieldPatcher`]
//! rewrites the binary form of the designated type so that it does:
//!
//! - a `public static volatile <Self> instance` field is added, and
//! - `aload_0; putstatic <Self>.instance` runs before every `return` of
//!   every constructor.
//!
//! After construction completes the static field holds the most recently
//! constructed instance. Constructors that exit by throwing do not publish.

pub mod classfile;
pub mod code;

use classfile::{ClassFile, ClassFormatError, Constant, Member, ACC_PUBLIC, ACC_STATIC, ACC_VOLATILE};
use code::{CodeAttribute, ALOAD_0, PUTSTATIC};

/// Name of the injected back-reference field
pub const INSTANCE_FIELD: &str = "instance";

/// Patch failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatchError {
    /// Input is not a well-formed class file
    #[error("malformed class file for {type_name}: {source}")]
    Format {
        /// Type being patched
        type_name: String,
        /// Format problem
        #[source]
        source: ClassFormatError,
    },

    /// Class file declares a different type than requested
    #[error("expected class {expected}, found {found}")]
    NameMismatch {
        /// Requested type
        expected: String,
        /// Type declared in the class file
        found: String,
    },

    /// Field to inject already exists
    #[error("{type_name} already declares a field named {field}")]
    FieldExists {
        /// Type being patched
        type_name: String,
        /// Conflicting field
        field: String,
    },

    /// Nothing to patch
    #[error("{type_name} declares no constructor")]
    NoConstructor {
        /// Type being patched
        type_name: String,
    },

    /// Constructor without bytecode
    #[error("a constructor of {type_name} has no Code attribute")]
    MissingCode {
        /// Type being patched
        type_name: String,
    },
}

impl PatchError {
    fn format(type_name: &str, source: ClassFormatError) -> Self {
        Self::Format {
            type_name: type_name.to_string(),
            source,
        }
    }
}

/// Rewrites the binary form of one type before it is defined
pub trait StructuralPatcher: Send + Sync {
    /// Return the patched image of `type_name`
    ///
    /// # Errors
    /// Returns [`PatchError`] if the image cannot be patched; the type must
    /// then not be defined at all.
    fn patch(&self, type_name: &str, image: &[u8]) -> Result<Vec<u8>, PatchError>;
}

/// Adds a static field holding the last constructed instance
#[derive(Debug, Clone)]
pub struct InstanceFieldPatcher {
    field: String,
}

impl Default for InstanceFieldPatcher {
    fn default() -> Self {
        Self::new(INSTANCE_FIELD)
    }
}

impl InstanceFieldPatcher {
    /// Create patcher injecting `field`
    #[inline]
    #[must_use]
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
        }
    }

    /// Name of the injected field
    #[inline]
    #[must_use]
    pub fn field(&self) -> &str {
        &self.field
    }
}

impl StructuralPatcher for InstanceFieldPatcher {
    fn patch(&self, type_name: &str, image: &[u8]) -> Result<Vec<u8>, PatchError> {
        let fail = |e| PatchError::format(type_name, e);
        let mut class = ClassFile::parse(image).map_err(fail)?;

        let found = class.binary_name().map_err(fail)?;
        if found != type_name {
            return Err(PatchError::NameMismatch {
                expected: type_name.to_string(),
                found,
            });
        }
        if class.field(&self.field).is_some() {
            return Err(PatchError::FieldExists {
                type_name: type_name.to_string(),
                field: self.field.clone(),
            });
        }

        let descriptor = format!("L{};", class.internal_name().map_err(fail)?);
        let name = class.pool.utf8_index(&self.field).map_err(fail)?;
        let descriptor = class.pool.utf8_index(&descriptor).map_err(fail)?;
        let name_and_type = class
            .pool
            .push(Constant::NameAndType { name, descriptor })
            .map_err(fail)?;
        let field_ref = class
            .pool
            .push(Constant::FieldRef {
                class: class.this_class,
                name_and_type,
            })
            .map_err(fail)?;
        class.fields.push(Member {
            access: ACC_PUBLIC | ACC_STATIC | ACC_VOLATILE,
            name,
            descriptor,
            attributes: Vec::new(),
        });

        let [hi, lo] = field_ref.to_be_bytes();
        let snippet = [ALOAD_0, PUTSTATIC, hi, lo];
        let init = class.pool.find_utf8(b"<init>");
        let code_name = class.pool.find_utf8(b"Code");

        let mut constructors = 0usize;
        let mut publish_points = 0usize;
        for method in &mut class.methods {
            if Some(method.name) != init {
                continue;
            }
            constructors += 1;
            let attribute = method
                .attributes
                .iter_mut()
                .find(|a| Some(a.name) == code_name)
                .ok_or_else(|| PatchError::MissingCode {
                    type_name: type_name.to_string(),
                })?;
            let mut body = CodeAttribute::parse(&attribute.data).map_err(fail)?;
            publish_points += body.insert_before_returns(snippet, &class.pool).map_err(fail)?;
            attribute.data = body.to_bytes();
        }
        if constructors == 0 {
            return Err(PatchError::NoConstructor {
                type_name: type_name.to_string(),
            });
        }

        tracing::debug!(
            type_name,
            field = %self.field,
            constructors,
            publish_points,
            "patched instance back-reference"
        );
        Ok(class.to_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use classfile::{Attribute, ConstantPool};

    /// `a.Server` with one `()V` constructor calling `Object.<init>`
    fn server_class(with_constructor: bool) -> Vec<u8> {
        let mut pool = ConstantPool::new();
        let this_name = pool.utf8_index("a/Server").unwrap();
        let this_class = pool.push(Constant::Class(this_name)).unwrap();
        let object_name = pool.utf8_index("java/lang/Object").unwrap();
        let super_class = pool.push(Constant::Class(object_name)).unwrap();
        let init = pool.utf8_index("<init>").unwrap();
        let void = pool.utf8_index("()V").unwrap();
        let nat = pool
            .push(Constant::NameAndType {
                name: init,
                descriptor: void,
            })
            .unwrap();
        let object_init = pool
            .push(Constant::MethodRef {
                class: super_class,
                name_and_type: nat,
            })
            .unwrap();
        let code_name = pool.utf8_index("Code").unwrap();
        let [hi, lo] = object_init.to_be_bytes();
        let body = CodeAttribute {
            max_stack: 1,
            max_locals: 1,
            code: vec![ALOAD_0, 0xb7, hi, lo, code::RETURN],
            exceptions: vec![],
            attributes: vec![],
        };
        let methods = if with_constructor {
            vec![Member {
                access: ACC_PUBLIC,
                name: init,
                descriptor: void,
                attributes: vec![Attribute {
                    name: code_name,
                    data: body.to_bytes(),
                }],
            }]
        } else {
            vec![]
        };
        ClassFile {
            minor: 0,
            major: 52,
            pool,
            access: ACC_PUBLIC,
            this_class,
            super_class,
            interfaces: vec![],
            fields: vec![],
            methods,
            attributes: vec![],
        }
        .to_bytes()
    }

    #[test]
    fn adds_static_field_and_publishes_in_constructor() {
        let patched = InstanceFieldPatcher::default()
            .patch("a.Server", &server_class(true))
            .unwrap();
        let class = ClassFile::parse(&patched).unwrap();

        let field = class.field(INSTANCE_FIELD).unwrap();
        assert!(field.is_static());
        assert_eq!(field.access, ACC_PUBLIC | ACC_STATIC | ACC_VOLATILE);
        assert_eq!(class.pool.utf8(field.descriptor).unwrap(), b"La/Server;");

        let init = class.methods_named("<init>").next().unwrap();
        let body = CodeAttribute::parse(&init.attributes[0].data).unwrap();
        assert_eq!(body.code.len(), 9);
        assert_eq!(&body.code[4..6], &[ALOAD_0, PUTSTATIC]);
        let field_ref = u16::from_be_bytes([body.code[6], body.code[7]]);
        match class.pool.get(field_ref).unwrap() {
            Constant::FieldRef { class: owner, .. } => assert_eq!(*owner, class.this_class),
            other => panic!("expected field ref, got {other:?}"),
        }
        assert_eq!(body.max_stack, 2);
    }

    #[test]
    fn rejects_existing_field() {
        let patcher = InstanceFieldPatcher::default();
        let once = patcher.patch("a.Server", &server_class(true)).unwrap();
        let err = patcher.patch("a.Server", &once).unwrap_err();
        assert!(matches!(err, PatchError::FieldExists { .. }));
    }

    #[test]
    fn rejects_class_without_constructor() {
        let err = InstanceFieldPatcher::default()
            .patch("a.Server", &server_class(false))
            .unwrap_err();
        assert_eq!(
            err,
            PatchError::NoConstructor {
                type_name: "a.Server".to_string()
            }
        );
    }

    #[test]
    fn rejects_name_mismatch() {
        let err = InstanceFieldPatcher::default()
            .patch("a.Other", &server_class(true))
            .unwrap_err();
        assert!(matches!(err, PatchError::NameMismatch { .. }));
    }

    #[test]
    fn rejects_garbage() {
        let err = InstanceFieldPatcher::default()
            .patch("a.Server", b"not a class")
            .unwrap_err();
        assert!(matches!(err, PatchError::Format { .. }));
    }
}
