#[cfg(test)]
mod tests {
    use crate::artifact::*;
    use std::fs;
    use std::path::Path;

    #[test]
    fn destination_uses_source_extension() {
        let sink = ArtifactSink::new("out");
        assert_eq!(
            sink.destination(Path::new("build/bbl.bin"), "xapian"),
            Path::new("out/xapian.bin")
        );
        assert_eq!(
            sink.destination(Path::new("build/bbl.elf"), "moses"),
            Path::new("out/moses.elf")
        );
        assert_eq!(sink.destination(Path::new("build/bbl"), "moses"), Path::new("out/moses.bin"));
    }

    #[test]
    fn ensure_dir_creates_parents_and_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let sink = ArtifactSink::new(dir.path().join("cpt_bins/tailbench-withsd"));
        sink.ensure_dir().expect("first");
        sink.ensure_dir().expect("second");
        assert!(sink.output_dir().is_dir());
    }

    #[test]
    fn collect_copies_and_overwrites() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = dir.path().join("bbl.bin");
        let sink = ArtifactSink::new(dir.path().join("out"));

        fs::write(&source, b"first").expect("write source");
        let first = sink.collect(&source, "img-dnn").expect("collect");
        assert_eq!(first.path, dir.path().join("out/img-dnn.bin"));
        assert_eq!(first.bytes, 5);

        fs::write(&source, b"second!").expect("rewrite source");
        let second = sink.collect(&source, "img-dnn").expect("collect again");
        assert_eq!(second.bytes, 7);
        assert_eq!(fs::read(&second.path).expect("read copy"), b"second!");
    }

    #[test]
    fn collect_fails_when_artifact_missing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let sink = ArtifactSink::new(dir.path().join("out"));
        let err = sink.collect(&dir.path().join("bbl.bin"), "moses").unwrap_err();
        assert!(err.to_string().contains("was not produced"));
        assert!(!sink.output_dir().exists());
    }
}
