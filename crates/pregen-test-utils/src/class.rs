use pregen_adapter::patch::classfile::{
    Attribute, ClassFile, Constant, ConstantPool, Member, ACC_PUBLIC, ACC_STATIC,
};
use pregen_adapter::patch::code::{CodeAttribute, ALOAD_0, RETURN};

const INVOKESPECIAL: u8 = 0xb7;

#[derive(Debug, Clone)]
struct FieldDecl {
    name: String,
    descriptor: String,
    is_static: bool,
}

/// Builder for minimal, well-formed class files
#[derive(Debug, Clone)]
pub struct ClassImage {
    name: String,
    fields: Vec<FieldDecl>,
    methods: Vec<(String, String)>,
    constructor: bool,
}

impl ClassImage {
    /// Class with a no-argument constructor calling `Object.<init>`
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            methods: Vec::new(),
            constructor: true,
        }
    }

    pub fn field(mut self, name: &str, descriptor: &str) -> Self {
        self.fields.push(FieldDecl {
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            is_static: false,
        });
        self
    }

    pub fn static_field(mut self, name: &str, descriptor: &str) -> Self {
        self.fields.push(FieldDecl {
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            is_static: true,
        });
        self
    }

    pub fn method(mut self, name: &str, descriptor: &str) -> Self {
        self.methods.push((name.to_string(), descriptor.to_string()));
        self
    }

    pub fn without_constructor(mut self) -> Self {
        self.constructor = false;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn build(&self) -> Vec<u8> {
        let mut pool = ConstantPool::new();
        let this_name = pool.utf8_index(&self.name.replace('.', "/")).unwrap();
        let this_class = pool.push(Constant::Class(this_name)).unwrap();
        let object_name = pool.utf8_index("java/lang/Object").unwrap();
        let super_class = pool.push(Constant::Class(object_name)).unwrap();
        let code_name = pool.utf8_index("Code").unwrap();

        let mut fields = Vec::new();
        for decl in &self.fields {
            let access = if decl.is_static {
                ACC_PUBLIC | ACC_STATIC
            } else {
                ACC_PUBLIC
            };
            fields.push(Member {
                access,
                name: pool.utf8_index(&decl.name).unwrap(),
                descriptor: pool.utf8_index(&decl.descriptor).unwrap(),
                attributes: vec![],
            });
        }

        let mut methods = Vec::new();
        if self.constructor {
            let init = pool.utf8_index("<init>").unwrap();
            let void = pool.utf8_index("()V").unwrap();
            let name_and_type = pool
                .push(Constant::NameAndType {
                    name: init,
                    descriptor: void,
                })
                .unwrap();
            let object_init = pool
                .push(Constant::MethodRef {
                    class: super_class,
                    name_and_type,
                })
                .unwrap();
            let [hi, lo] = object_init.to_be_bytes();
            let body = CodeAttribute {
                max_stack: 1,
                max_locals: 1,
                code: vec![ALOAD_0, INVOKESPECIAL, hi, lo, RETURN],
                exceptions: vec![],
                attributes: vec![],
            };
            methods.push(Member {
                access: ACC_PUBLIC,
                name: init,
                descriptor: void,
                attributes: vec![Attribute {
                    name: code_name,
                    data: body.to_bytes(),
                }],
            });
        }
        for (name, descriptor) in &self.methods {
            let body = CodeAttribute {
                max_stack: 0,
                max_locals: 4,
                code: vec![RETURN],
                exceptions: vec![],
                attributes: vec![],
            };
            methods.push(Member {
                access: ACC_PUBLIC,
                name: pool.utf8_index(name).unwrap(),
                descriptor: pool.utf8_index(descriptor).unwrap(),
                attributes: vec![Attribute {
                    name: code_name,
                    data: body.to_bytes(),
                }],
            });
        }

        ClassFile {
            minor: 0,
            major: 52,
            pool,
            access: ACC_PUBLIC,
            this_class,
            super_class,
            interfaces: vec![],
            fields,
            methods,
            attributes: vec![],
        }
        .to_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_parseable_class() {
        let bytes = ClassImage::new("a.b.Server")
            .field("ready", "Z")
            .static_field("KEY", "La/b/Key;")
            .method("tick", "()V")
            .build();
        let class = ClassFile::parse(&bytes).unwrap();
        assert_eq!(class.binary_name().unwrap(), "a.b.Server");
        assert!(class.field("KEY").unwrap().is_static());
        assert!(!class.field("ready").unwrap().is_static());
        assert_eq!(class.methods_named("<init>").count(), 1);
        assert_eq!(class.methods_named("tick").count(), 1);
    }
}
