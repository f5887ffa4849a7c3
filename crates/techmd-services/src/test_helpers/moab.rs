use std::collections::hash_map::DefaultHasher;
use std::fmt::Write as _;
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

use crate::moab::MoabStorage;

/// Writes a Moab for `druid` under `{root}/sdr2objects`, one version per
/// entry of `versions`, each a list of (path, content). Bytes are stored
/// only by the version that first adds a given content, like real
/// preservation storage. Returns the object directory.
pub fn write_moab(root: &Path, druid: &str, versions: &[&[(&str, &str)]]) -> PathBuf {
    let object_dir = root
        .join("sdr2objects")
        .join(MoabStorage::druid_tree(druid).unwrap());
    // (md5, size, originalVersion, storagePath), cumulative across versions
    let mut catalog: Vec<(String, usize, u32, String)> = Vec::new();

    for (index, files) in versions.iter().enumerate() {
        let version = index as u32 + 1;
        let version_dir = object_dir.join(format!("v{:04}", version));
        let manifests = version_dir.join("manifests");
        fs::create_dir_all(&manifests).unwrap();

        let mut inventory = String::new();
        writeln!(
            inventory,
            r#"<?xml version="1.0" encoding="UTF-8"?>
<fileInventory type="version" objectId="{druid}" versionId="{version}">
  <fileGroup groupId="content" dataSource="" fileCount="{}">"#,
            files.len()
        )
        .unwrap();

        for (path, content) in files.iter() {
            let md5 = fake_md5(content);
            if !catalog.iter().any(|(stored, ..)| *stored == md5) {
                let target = version_dir.join("data/content").join(path);
                fs::create_dir_all(target.parent().unwrap()).unwrap();
                fs::write(&target, content).unwrap();
                catalog.push((md5.clone(), content.len(), version, path.to_string()));
            }
            writeln!(
                inventory,
                r#"    <file>
      <fileSignature size="{}" md5="{md5}" sha1="" sha256=""/>
      <fileInstance path="{}" datetime="2012-03-26T14:15:11Z"/>
    </file>"#,
                content.len(),
                escape(path)
            )
            .unwrap();
        }
        inventory.push_str("  </fileGroup>\n</fileInventory>\n");
        fs::write(manifests.join("versionInventory.xml"), inventory).unwrap();

        let mut signatures = String::from(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<signatureCatalog>\n",
        );
        for (md5, size, original, storage_path) in &catalog {
            writeln!(
                signatures,
                r#"  <entry originalVersion="{original}" groupId="content" storagePath="{}">
    <fileSignature size="{size}" md5="{md5}" sha1="" sha256=""/>
  </entry>"#,
                escape(storage_path)
            )
            .unwrap();
        }
        signatures.push_str("</signatureCatalog>\n");
        fs::write(manifests.join("signatureCatalog.xml"), signatures).unwrap();
    }

    object_dir
}

fn fake_md5(content: &str) -> String {
    let mut hasher = DefaultHasher::new();
    content.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

fn escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
}
