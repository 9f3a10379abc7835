//! Build graph model and LLB encoding.
//!
//! A [`Graph`] is a root state followed by file operations applied to it in
//! order. [`Graph::marshal`] lowers it into the content-addressed LLB
//! `Definition` the engine solves:
//!
//! ```text
//!  root (scratch | docker-image | local)
//!    │
//!    ├─ copy   local://<context>:/<src> → <dest>
//!    ├─ copy   ...
//!    ├─ mkfile <path>
//!    ▼
//!  terminal op (single input = final state)
//! ```

pub mod pb;

use std::collections::{BTreeMap, HashSet};

use bunny_core::error::Result;
use bunny_core::Platform;
use prost::Message;
use sha2::{Digest, Sha256};

use crate::reference::ImageReference;

/// Description key the engine shows as the step name.
const CUSTOM_NAME_KEY: &str = "llb.customname";

/// Where the graph's filesystem starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Root {
    /// Empty filesystem
    Scratch,
    /// Pulled image, optionally for a platform other than the target
    Image {
        reference: String,
        platform: Option<Platform>,
    },
    /// Files selected from a named build context
    Local {
        name: String,
        follow_paths: Vec<String>,
    },
}

/// A file operation applied on top of the current state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileStep {
    /// Copy `source` from build context `context` into `dest`
    Copy {
        context: String,
        source: String,
        dest: String,
    },
    /// Create a file with fixed contents
    MkFile {
        path: String,
        mode: u32,
        data: Vec<u8>,
    },
}

/// Ordered build graph targeted at one platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Graph {
    pub root: Root,
    pub steps: Vec<FileStep>,
    pub platform: Platform,
    /// Session that local sources are read through
    pub session_id: Option<String>,
}

impl Graph {
    pub fn new(root: Root, platform: Platform) -> Self {
        Self {
            root,
            steps: Vec::new(),
            platform,
            session_id: None,
        }
    }

    pub fn with_session(mut self, session_id: Option<String>) -> Self {
        self.session_id = session_id;
        self
    }

    /// Append a copy from a named context, creating parent directories.
    pub fn copy(
        &mut self,
        context: impl Into<String>,
        source: impl Into<String>,
        dest: impl Into<String>,
    ) -> &mut Self {
        self.steps.push(FileStep::Copy {
            context: context.into(),
            source: source.into(),
            dest: dest.into(),
        });
        self
    }

    /// Append a file creation.
    pub fn mkfile(&mut self, path: impl Into<String>, mode: u32, data: Vec<u8>) -> &mut Self {
        self.steps.push(FileStep::MkFile {
            path: path.into(),
            mode,
            data,
        });
        self
    }

    /// Lower the graph into an LLB definition.
    pub fn marshal(&self) -> Result<pb::Definition> {
        let mut m = Marshaller::default();

        let mut current = match &self.root {
            Root::Scratch => None,
            Root::Image {
                reference,
                platform,
            } => {
                let identifier = format!("docker-image://{}", ImageReference::normalize(reference)?);
                let op = pb::Op {
                    inputs: Vec::new(),
                    op: Some(pb::op::Op::Source(pb::SourceOp {
                        identifier,
                        attrs: BTreeMap::new(),
                    })),
                    platform: Some(to_pb_platform(platform.as_ref().unwrap_or(&self.platform))),
                };
                Some(m.add(&op, None))
            }
            Root::Local { name, follow_paths } => Some(m.add(&self.local_op(name, follow_paths)?, None)),
        };

        for step in &self.steps {
            let (op, name) = match step {
                FileStep::Copy {
                    context,
                    source,
                    dest,
                } => {
                    let local = m.add(&self.local_op(context, &[])?, None);
                    let (inputs, input, secondary_input) = match current.take() {
                        Some(base) => (vec![base, local], 0, 1),
                        None => (vec![local], -1, 0),
                    };
                    let action = pb::FileAction {
                        input,
                        secondary_input,
                        output: 0,
                        action: Some(pb::file_action::Action::Copy(pb::FileActionCopy {
                            src: absolute(source),
                            dest: absolute(dest),
                            mode: -1,
                            follow_symlink: true,
                            dir_copy_contents: true,
                            create_dest_path: true,
                            allow_wildcard: true,
                            allow_empty_wildcard: true,
                            timestamp: -1,
                        })),
                    };
                    (file_op(inputs, action, &self.platform), format!("COPY {} {}", source, dest))
                }
                FileStep::MkFile { path, mode, data } => {
                    let (inputs, input) = match current.take() {
                        Some(base) => (vec![base], 0),
                        None => (Vec::new(), -1),
                    };
                    let action = pb::FileAction {
                        input,
                        secondary_input: -1,
                        output: 0,
                        action: Some(pb::file_action::Action::Mkfile(pb::FileActionMkFile {
                            path: absolute(path),
                            mode: *mode as i32,
                            data: data.clone(),
                            timestamp: -1,
                        })),
                    };
                    (file_op(inputs, action, &self.platform), format!("mkfile {}", path))
                }
            };
            current = Some(m.add(&op, Some(name)));
        }

        // Terminal op marks the graph's output
        let terminal = pb::Op {
            inputs: current.into_iter().collect(),
            op: None,
            platform: None,
        };
        m.add(&terminal, None);

        Ok(pb::Definition {
            def: m.def,
            metadata: m.metadata,
        })
    }

    fn local_op(&self, name: &str, follow_paths: &[String]) -> Result<pb::Op> {
        let mut attrs = BTreeMap::new();
        attrs.insert("local.sharedkeyhint".to_string(), name.to_string());
        if let Some(ref session) = self.session_id {
            attrs.insert("local.session".to_string(), session.clone());
        }
        if !follow_paths.is_empty() {
            attrs.insert(
                "local.followpaths".to_string(),
                serde_json::to_string(follow_paths)?,
            );
        }
        Ok(pb::Op {
            inputs: Vec::new(),
            op: Some(pb::op::Op::Source(pb::SourceOp {
                identifier: format!("local://{}", name),
                attrs,
            })),
            platform: Some(to_pb_platform(&self.platform)),
        })
    }
}

/// Accumulates encoded ops keyed by content digest.
#[derive(Default)]
struct Marshaller {
    def: Vec<Vec<u8>>,
    seen: HashSet<String>,
    metadata: BTreeMap<String, pb::OpMetadata>,
}

impl Marshaller {
    /// Encode `op`, store it once, and return an edge to its output 0.
    fn add(&mut self, op: &pb::Op, name: Option<String>) -> pb::Input {
        let bytes = op.encode_to_vec();
        let digest = op_digest(&bytes);
        if let Some(name) = name {
            self.metadata
                .entry(digest.clone())
                .or_default()
                .description
                .insert(CUSTOM_NAME_KEY.to_string(), name);
        }
        if self.seen.insert(digest.clone()) {
            self.def.push(bytes);
        }
        pb::Input { digest, index: 0 }
    }
}

/// Content digest of an encoded op.
pub fn op_digest(bytes: &[u8]) -> String {
    format!("sha256:{}", hex::encode(Sha256::digest(bytes)))
}

fn file_op(inputs: Vec<pb::Input>, action: pb::FileAction, platform: &Platform) -> pb::Op {
    pb::Op {
        inputs,
        op: Some(pb::op::Op::File(pb::FileOp {
            actions: vec![action],
        })),
        platform: Some(to_pb_platform(platform)),
    }
}

fn to_pb_platform(platform: &Platform) -> pb::Platform {
    pb::Platform {
        architecture: platform.architecture.clone(),
        os: platform.os.clone(),
        variant: platform.variant.clone().unwrap_or_default(),
    }
}

/// Anchor a path at the filesystem root, keeping any trailing slash.
fn absolute(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path.trim_start_matches("./"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_ops(def: &pb::Definition) -> Vec<pb::Op> {
        def.def
            .iter()
            .map(|bytes| pb::Op::decode(bytes.as_slice()).unwrap())
            .collect()
    }

    fn source_identifier(op: &pb::Op) -> Option<&str> {
        match &op.op {
            Some(pb::op::Op::Source(src)) => Some(src.identifier.as_str()),
            _ => None,
        }
    }

    fn file_action(op: &pb::Op) -> &pb::FileAction {
        match &op.op {
            Some(pb::op::Op::File(file)) => &file.actions[0],
            other => panic!("expected file op, got {:?}", other),
        }
    }

    #[test]
    fn test_scratch_only_graph() {
        let graph = Graph::new(Root::Scratch, Platform::linux_amd64());
        let def = graph.marshal().unwrap();
        let ops = decode_ops(&def);
        assert_eq!(ops.len(), 1);
        assert!(ops[0].inputs.is_empty());
        assert!(ops[0].op.is_none());
    }

    #[test]
    fn test_copy_onto_scratch_uses_empty_input() {
        let mut graph = Graph::new(Root::Scratch, Platform::linux_amd64());
        graph.copy("context", "a.bin", "/bin/a.bin");
        let ops = decode_ops(&graph.marshal().unwrap());

        // local source, copy, terminal
        assert_eq!(ops.len(), 3);
        assert_eq!(source_identifier(&ops[0]), Some("local://context"));
        let action = file_action(&ops[1]);
        assert_eq!(action.input, -1);
        assert_eq!(action.secondary_input, 0);
        match &action.action {
            Some(pb::file_action::Action::Copy(copy)) => {
                assert_eq!(copy.src, "/a.bin");
                assert_eq!(copy.dest, "/bin/a.bin");
                assert!(copy.create_dest_path);
            }
            other => panic!("expected copy, got {:?}", other),
        }
    }

    #[test]
    fn test_steps_chain_in_order() {
        let mut graph = Graph::new(Root::Scratch, Platform::linux_amd64());
        graph
            .copy("context", "kernel", "/unikernel/kernel")
            .copy("context", "initrd", "/unikernel/initrd")
            .mkfile("/urunc.json", 0o644, b"{}".to_vec());
        let def = graph.marshal().unwrap();
        let ops = decode_ops(&def);

        // The local source is shared by both copies
        assert_eq!(ops.len(), 5);
        let digests: Vec<String> = def.def.iter().map(|b| op_digest(b)).collect();

        let second_copy = &ops[2];
        assert_eq!(second_copy.inputs[0].digest, digests[1]);
        assert_eq!(second_copy.inputs[1].digest, digests[0]);
        assert_eq!(file_action(second_copy).input, 0);

        let mkfile = &ops[3];
        assert_eq!(mkfile.inputs[0].digest, digests[2]);
        match &file_action(mkfile).action {
            Some(pb::file_action::Action::Mkfile(mk)) => {
                assert_eq!(mk.path, "/urunc.json");
                assert_eq!(mk.mode, 0o644);
                assert_eq!(mk.data, b"{}");
            }
            other => panic!("expected mkfile, got {:?}", other),
        }

        assert_eq!(ops[4].inputs[0].digest, digests[3]);
        assert_eq!(
            def.metadata[&digests[1]].description[CUSTOM_NAME_KEY],
            "COPY kernel /unikernel/kernel"
        );
    }

    #[test]
    fn test_image_root_normalized_with_target_platform() {
        let graph = Graph::new(
            Root::Image {
                reference: "alpine:3.19".to_string(),
                platform: None,
            },
            Platform::new("linux", "arm64"),
        );
        let ops = decode_ops(&graph.marshal().unwrap());
        assert_eq!(
            source_identifier(&ops[0]),
            Some("docker-image://docker.io/library/alpine:3.19")
        );
        let platform = ops[0].platform.as_ref().unwrap();
        assert_eq!(platform.os, "linux");
        assert_eq!(platform.architecture, "arm64");
    }

    #[test]
    fn test_every_op_but_terminal_carries_target_platform() {
        let mut graph = Graph::new(Root::Scratch, Platform::new("linux", "arm64"));
        graph
            .copy("context", "a.bin", "/a.bin")
            .mkfile("/urunc.json", 0o644, b"{}".to_vec());
        let ops = decode_ops(&graph.marshal().unwrap());

        let (terminal, rest) = ops.split_last().unwrap();
        assert!(terminal.platform.is_none());
        assert_eq!(rest.len(), 3);
        for op in rest {
            let platform = op.platform.as_ref().unwrap();
            assert_eq!(platform.os, "linux");
            assert_eq!(platform.architecture, "arm64");
        }
    }

    #[test]
    fn test_image_root_platform_override() {
        let graph = Graph::new(
            Root::Image {
                reference: "unikraft.org/nginx:1.15".to_string(),
                platform: Some(Platform::new("qemu", "amd64")),
            },
            Platform::linux_amd64(),
        );
        let ops = decode_ops(&graph.marshal().unwrap());
        assert_eq!(ops[0].platform.as_ref().unwrap().os, "qemu");
    }

    #[test]
    fn test_invalid_image_reference_fails() {
        let graph = Graph::new(
            Root::Image {
                reference: "nginx@nodigest".to_string(),
                platform: None,
            },
            Platform::linux_amd64(),
        );
        assert!(graph.marshal().is_err());
    }

    #[test]
    fn test_local_root_follow_paths_and_session() {
        let graph = Graph::new(
            Root::Local {
                name: "context".to_string(),
                follow_paths: vec!["Containerfile".to_string()],
            },
            Platform::linux_amd64(),
        )
        .with_session(Some("sess-1".to_string()));
        let ops = decode_ops(&graph.marshal().unwrap());
        match &ops[0].op {
            Some(pb::op::Op::Source(src)) => {
                assert_eq!(src.attrs["local.followpaths"], "[\"Containerfile\"]");
                assert_eq!(src.attrs["local.session"], "sess-1");
                assert_eq!(src.attrs["local.sharedkeyhint"], "context");
            }
            other => panic!("expected source, got {:?}", other),
        }
    }

    #[test]
    fn test_marshal_is_deterministic() {
        let mut graph = Graph::new(Root::Scratch, Platform::linux_amd64());
        graph
            .copy("context", "a", "/a")
            .mkfile("/urunc.json", 0o644, b"{\"k\":\"dg==\"}".to_vec());
        let first = graph.marshal().unwrap().encode_to_vec();
        let second = graph.marshal().unwrap().encode_to_vec();
        assert_eq!(first, second);
    }

    #[test]
    fn test_absolute() {
        assert_eq!(absolute("a.bin"), "/a.bin");
        assert_eq!(absolute("./a.bin"), "/a.bin");
        assert_eq!(absolute("/bin/"), "/bin/");
        assert_eq!(absolute("dir/"), "/dir/");
    }
}
