// tests/common/mod.rs

//! Shared fixture builders for integration tests.
//!
//! Tests assemble a metadata cache on disk exactly the way the resolver
//! expects it: `<cache>/<repo>/repomd.xml` plus gzip-compressed primary
//! (and optionally filelists) payloads referenced from it.

use flate2::write::GzEncoder;
use flate2::Compression;
use std::fmt::Write as _;
use std::fs;
use std::io::Write as _;
use std::path::Path;

/// A capability entry for fixture packages
#[derive(Debug, Clone, Default)]
pub struct Cap {
    pub name: String,
    pub flags: Option<&'static str>,
    pub epoch: Option<u64>,
    pub version: Option<String>,
    pub release: Option<String>,
}

impl Cap {
    pub fn named(name: &str) -> Self {
        Cap {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn versioned(name: &str, flags: &'static str, version: &str, release: &str) -> Self {
        Cap {
            name: name.to_string(),
            flags: Some(flags),
            epoch: Some(0),
            version: Some(version.to_string()),
            release: Some(release.to_string()),
        }
    }
}

/// One fixture package rendered into primary.xml
#[derive(Debug, Clone)]
pub struct PkgSpec {
    pub name: String,
    pub epoch: u64,
    pub version: String,
    pub release: String,
    pub arch: String,
    pub sha256: String,
    pub provides: Vec<Cap>,
    pub requires: Vec<Cap>,
    pub conflicts: Vec<Cap>,
    pub files: Vec<String>,
}

impl PkgSpec {
    pub fn new(name: &str, version: &str, release: &str, arch: &str) -> Self {
        let mut spec = PkgSpec {
            name: name.to_string(),
            epoch: 0,
            version: version.to_string(),
            release: release.to_string(),
            arch: arch.to_string(),
            sha256: format!("{:0>64}", name.len()),
            provides: Vec::new(),
            requires: Vec::new(),
            conflicts: Vec::new(),
            files: Vec::new(),
        };
        // every real package provides its own name at its own EVR
        spec.provides.push(Cap {
            name: name.to_string(),
            flags: Some("EQ"),
            epoch: Some(0),
            version: Some(version.to_string()),
            release: Some(release.to_string()),
        });
        spec
    }

    pub fn sha256(mut self, digest: &str) -> Self {
        self.sha256 = digest.to_string();
        self
    }

    pub fn provides(mut self, cap: Cap) -> Self {
        self.provides.push(cap);
        self
    }

    pub fn requires(mut self, cap: Cap) -> Self {
        self.requires.push(cap);
        self
    }

    pub fn conflicts(mut self, cap: Cap) -> Self {
        self.conflicts.push(cap);
        self
    }

    pub fn file(mut self, path: &str) -> Self {
        self.files.push(path.to_string());
        self
    }

    fn location(&self) -> String {
        format!(
            "Packages/{}-{}-{}.{}.rpm",
            self.name, self.version, self.release, self.arch
        )
    }
}

fn render_caps(out: &mut String, tag: &str, caps: &[Cap]) {
    if caps.is_empty() {
        return;
    }
    let _ = writeln!(out, "      <rpm:{}>", tag);
    for cap in caps {
        let mut attrs = format!(" name=\"{}\"", cap.name);
        if let Some(flags) = cap.flags {
            let _ = write!(attrs, " flags=\"{}\"", flags);
        }
        if let Some(epoch) = cap.epoch {
            let _ = write!(attrs, " epoch=\"{}\"", epoch);
        }
        if let Some(version) = &cap.version {
            let _ = write!(attrs, " ver=\"{}\"", version);
        }
        if let Some(release) = &cap.release {
            let _ = write!(attrs, " rel=\"{}\"", release);
        }
        let _ = writeln!(out, "        <rpm:entry{}/>", attrs);
    }
    let _ = writeln!(out, "      </rpm:{}>", tag);
}

/// Render a complete primary.xml document
pub fn render_primary(packages: &[PkgSpec]) -> String {
    let mut out = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <metadata xmlns=\"http://linux.duke.edu/metadata/common\" \
         xmlns:rpm=\"http://linux.duke.edu/metadata/rpm\" packages=\"0\">\n",
    );
    for pkg in packages {
        let _ = writeln!(out, "  <package type=\"rpm\">");
        let _ = writeln!(out, "    <name>{}</name>", pkg.name);
        let _ = writeln!(out, "    <arch>{}</arch>", pkg.arch);
        let _ = writeln!(
            out,
            "    <version epoch=\"{}\" ver=\"{}\" rel=\"{}\"/>",
            pkg.epoch, pkg.version, pkg.release
        );
        let _ = writeln!(
            out,
            "    <checksum type=\"sha256\" pkgid=\"YES\">{}</checksum>",
            pkg.sha256
        );
        let _ = writeln!(out, "    <location href=\"{}\"/>", pkg.location());
        let _ = writeln!(out, "    <format>");
        render_caps(&mut out, "provides", &pkg.provides);
        render_caps(&mut out, "requires", &pkg.requires);
        render_caps(&mut out, "conflicts", &pkg.conflicts);
        for file in &pkg.files {
            let _ = writeln!(out, "      <file>{}</file>", file);
        }
        let _ = writeln!(out, "    </format>");
        let _ = writeln!(out, "  </package>");
    }
    out.push_str("</metadata>\n");
    out
}

/// Render a filelists.xml document for the same fixture packages
pub fn render_filelists(packages: &[PkgSpec]) -> String {
    let mut out = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <filelists xmlns=\"http://linux.duke.edu/metadata/filelists\" packages=\"0\">\n",
    );
    for pkg in packages {
        let _ = writeln!(
            out,
            "  <package pkgid=\"{}\" name=\"{}\" arch=\"{}\">",
            pkg.sha256, pkg.name, pkg.arch
        );
        let _ = writeln!(
            out,
            "    <version epoch=\"{}\" ver=\"{}\" rel=\"{}\"/>",
            pkg.epoch, pkg.version, pkg.release
        );
        for file in &pkg.files {
            let _ = writeln!(out, "    <file>{}</file>", file);
        }
        let _ = writeln!(out, "  </package>");
    }
    out.push_str("</filelists>\n");
    out
}

fn gzip(data: &str) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data.as_bytes()).unwrap();
    encoder.finish().unwrap()
}

/// Write one repository's metadata into the cache layout
pub fn write_repo_cache(cache_dir: &Path, repo_name: &str, packages: &[PkgSpec]) {
    let repo_dir = cache_dir.join(repo_name);
    fs::create_dir_all(&repo_dir).unwrap();

    let repomd = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <repomd xmlns=\"http://linux.duke.edu/metadata/repo\">\n\
           <data type=\"primary\">\n\
             <checksum type=\"sha256\">unused</checksum>\n\
             <location href=\"repodata/fixture-primary.xml.gz\"/>\n\
           </data>\n\
           <data type=\"filelists\">\n\
             <checksum type=\"sha256\">unused</checksum>\n\
             <location href=\"repodata/fixture-filelists.xml.gz\"/>\n\
           </data>\n\
         </repomd>\n";
    fs::write(repo_dir.join("repomd.xml"), repomd).unwrap();
    fs::write(
        repo_dir.join("fixture-primary.xml.gz"),
        gzip(&render_primary(packages)),
    )
    .unwrap();
    fs::write(
        repo_dir.join("fixture-filelists.xml.gz"),
        gzip(&render_filelists(packages)),
    )
    .unwrap();
}

/// Write a repo-list YAML file describing the given repositories
pub fn write_repofile(path: &Path, repos: &[(&str, i32)]) {
    let mut out = String::from("repositories:\n");
    for (name, priority) in repos {
        let _ = writeln!(out, "  - name: {}", name);
        let _ = writeln!(out, "    arch: x86_64");
        let _ = writeln!(out, "    priority: {}", priority);
        let _ = writeln!(out, "    baseurl: https://{}.example/repo/", name);
    }
    fs::write(path, out).unwrap();
}
