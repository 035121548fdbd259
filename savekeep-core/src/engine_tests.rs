/*!
Tests for the save engine pipeline: hook ordering, failure wrapping, storage
modes and encodings.
*/

#[cfg(test)]
mod tests {
    use crate::cipher::MockCipher;
    use crate::codec::{Codec, GzipJsonCodec, TextEncoding};
    use crate::config::{BaseLocation, PathConvention, SaveSettings};
    use crate::lifecycle::{LifecycleEvent, LifecycleStage};
    use crate::options::SaveOptions;
    use crate::{Result, SaveEngine, SaveError};
    use serde::{Deserialize, Serialize};
    use serde_json::{json, Value};
    use std::io::{Read, Write};
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    #[derive(Serialize, Deserialize, Default, Debug, Clone, PartialEq)]
    struct Progress {
        score: u32,
        level: String,
    }

    /// Codec whose every call fails
    struct BrokenCodec;

    impl Codec for BrokenCodec {
        fn serialize(&self, _: &Value, _: &mut dyn Write, _: TextEncoding) -> Result<()> {
            Err(SaveError::compression("codec offline"))
        }

        fn deserialize(&self, _: &mut dyn Read, _: TextEncoding) -> Result<Option<Value>> {
            Err(SaveError::compression("codec offline"))
        }

        fn name(&self) -> &str {
            "broken"
        }
    }

    fn engine_in(dir: &TempDir) -> SaveEngine {
        SaveEngine::new(SaveSettings::with_root(dir.path())).unwrap()
    }

    fn kv_engine(dir: &TempDir) -> SaveEngine {
        let settings = SaveSettings {
            use_key_value_store: true,
            ..SaveSettings::with_root(dir.path())
        };
        SaveEngine::new(settings).unwrap()
    }

    fn push(
        stages: &Arc<Mutex<Vec<LifecycleStage>>>,
    ) -> impl Fn(&LifecycleEvent<'_>) + Send + Sync + 'static {
        let stages = Arc::clone(stages);
        move |event| stages.lock().unwrap().push(event.stage)
    }

    fn record_stages(engine: &SaveEngine) -> Arc<Mutex<Vec<LifecycleStage>>> {
        let stages = Arc::new(Mutex::new(Vec::new()));

        let lifecycle = engine.lifecycle();
        lifecycle.on_saving(push(&stages));
        lifecycle.on_saved(push(&stages));
        lifecycle.on_loading(push(&stages));
        lifecycle.on_loaded(push(&stages));
        lifecycle.set_save_callback(push(&stages));
        lifecycle.set_load_callback(push(&stages));
        stages
    }

    fn progress() -> Progress {
        Progress {
            score: 42,
            level: "forest".to_string(),
        }
    }

    #[test]
    fn test_save_and_load_fire_hooks_in_order() {
        let dir = TempDir::new().unwrap();
        let engine = engine_in(&dir);
        let stages = record_stages(&engine);

        engine.save("slot", &progress(), &SaveOptions::new()).unwrap();
        let loaded = engine
            .load("slot", Progress::default(), &SaveOptions::new())
            .unwrap();
        assert_eq!(loaded, progress());

        assert_eq!(
            *stages.lock().unwrap(),
            vec![
                LifecycleStage::BeforeSave,
                LifecycleStage::SaveCallback,
                LifecycleStage::AfterSave,
                LifecycleStage::BeforeLoad,
                LifecycleStage::LoadCallback,
                LifecycleStage::AfterLoad,
            ]
        );
    }

    #[test]
    fn test_missing_record_fires_only_before_load() {
        let dir = TempDir::new().unwrap();
        let engine = engine_in(&dir);
        let stages = record_stages(&engine);

        let loaded = engine
            .load("missing", progress(), &SaveOptions::new())
            .unwrap();
        assert_eq!(loaded, progress());
        assert_eq!(*stages.lock().unwrap(), vec![LifecycleStage::BeforeLoad]);
    }

    #[test]
    fn test_hooks_see_value_and_effective_options() {
        let dir = TempDir::new().unwrap();
        let engine = engine_in(&dir);
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        engine.lifecycle().on_saved(move |event| {
            sink.lock().unwrap().push((
                event.identifier.to_string(),
                event.value.cloned(),
                event.options.encrypt,
                event.options.password.clone(),
                event.options.location,
            ));
        });
        let sink = Arc::clone(&seen);
        engine.lifecycle().set_load_callback(move |event| {
            sink.lock().unwrap().push((
                event.identifier.to_string(),
                event.value.cloned(),
                event.options.encrypt,
                event.options.password.clone(),
                event.options.location,
            ));
        });

        let options = SaveOptions::at(BaseLocation::SecondaryStorage)
            .with_encrypt(true)
            .with_password("p1");
        engine.save("slot", &progress(), &options).unwrap();
        engine.load("slot", Progress::default(), &options).unwrap();

        let expected_value = Some(json!({"score": 42, "level": "forest"}));
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        for entry in seen.iter() {
            assert_eq!(entry.0, "slot");
            assert_eq!(entry.1, expected_value);
            assert!(entry.2);
            assert_eq!(entry.3, "p1");
            assert_eq!(entry.4, BaseLocation::SecondaryStorage);
        }
    }

    #[test]
    fn test_codec_failure_is_wrapped_and_skips_after_save() {
        let dir = TempDir::new().unwrap();
        let engine = engine_in(&dir).with_codec(Arc::new(BrokenCodec));
        let stages = record_stages(&engine);

        let err = engine
            .save("slot", &progress(), &SaveOptions::new())
            .unwrap_err();
        match &err {
            SaveError::SaveFailed { identifier, source } => {
                assert_eq!(identifier, "slot");
                assert!(matches!(**source, SaveError::Compression(_)));
            }
            other => panic!("expected SaveFailed, got {other:?}"),
        }
        assert_eq!(*stages.lock().unwrap(), vec![LifecycleStage::BeforeSave]);
        assert!(!engine.exists("slot", None).unwrap());
    }

    #[test]
    fn test_cipher_failure_is_wrapped() {
        let dir = TempDir::new().unwrap();
        let mut cipher = MockCipher::new();
        cipher
            .expect_encode()
            .times(1)
            .returning(|_, _| Err(SaveError::storage("cipher offline")));

        let engine = engine_in(&dir).with_cipher(Arc::new(cipher));
        let err = engine
            .save("slot", &progress(), &SaveOptions::new().with_encrypt(true))
            .unwrap_err();

        assert!(matches!(err, SaveError::SaveFailed { .. }));
        assert!(err.to_string().contains("cipher offline"));
        assert!(!engine.exists("slot", None).unwrap());
    }

    #[test]
    fn test_cipher_receives_base64_and_password() {
        let dir = TempDir::new().unwrap();
        let mut cipher = MockCipher::new();
        cipher
            .expect_encode()
            .withf(|plaintext, password| {
                plaintext == "eyJsZXZlbCI6ImZvcmVzdCIsInNjb3JlIjo0Mn0=" && password == "p1"
            })
            .times(1)
            .returning(|plaintext, _| Ok(format!("wrapped:{plaintext}")));
        cipher
            .expect_decode()
            .times(1)
            .returning(|ciphertext, _| {
                ciphertext
                    .strip_prefix("wrapped:")
                    .map(str::to_string)
                    .ok_or_else(|| SaveError::decode_failed("not wrapped"))
            });

        let engine = engine_in(&dir).with_cipher(Arc::new(cipher));
        let options = SaveOptions::new().with_encrypt(true).with_password("p1");
        engine.save("slot", &progress(), &options).unwrap();

        let stored = std::fs::read_to_string(dir.path().join("primary/slot")).unwrap();
        assert!(stored.starts_with("wrapped:"));

        let loaded = engine.load("slot", Progress::default(), &options).unwrap();
        assert_eq!(loaded, progress());
    }

    #[test]
    fn test_decode_failure_is_wrapped_in_load_failed() {
        let dir = TempDir::new().unwrap();
        let mut cipher = MockCipher::new();
        cipher
            .expect_encode()
            .returning(|plaintext, _| Ok(plaintext.to_string()));
        cipher
            .expect_decode()
            .returning(|_, _| Err(SaveError::decode_failed("bad password")));

        let engine = engine_in(&dir).with_cipher(Arc::new(cipher));
        let stages = record_stages(&engine);
        let options = SaveOptions::new().with_encrypt(true);
        engine.save("slot", &progress(), &options).unwrap();

        let err = engine
            .load("slot", Progress::default(), &options)
            .unwrap_err();
        assert!(matches!(err, SaveError::LoadFailed { .. }));
        assert!(err.is_decode_failure());
        assert_eq!(err.identifier(), Some("slot"));

        // No load callback or after-load on failure
        assert_eq!(
            stages.lock().unwrap().last(),
            Some(&LifecycleStage::BeforeLoad)
        );
    }

    #[test]
    fn test_invalid_identifier_is_not_wrapped() {
        let dir = TempDir::new().unwrap();
        let engine = engine_in(&dir);
        let stages = record_stages(&engine);

        assert!(matches!(
            engine.save("", &progress(), &SaveOptions::new()),
            Err(SaveError::InvalidIdentifier)
        ));
        assert!(matches!(
            engine.load("", progress(), &SaveOptions::new()),
            Err(SaveError::InvalidIdentifier)
        ));
        assert!(matches!(engine.exists("", None), Err(SaveError::InvalidIdentifier)));
        assert!(matches!(engine.delete("", None), Err(SaveError::InvalidIdentifier)));

        assert!(stages.lock().unwrap().is_empty());
        assert!(!dir.path().join("primary").exists());
    }

    #[test]
    fn test_absent_value_saves_zero_value() {
        let dir = TempDir::new().unwrap();
        let engine = engine_in(&dir);

        engine
            .save_option::<Progress>("slot", None, &SaveOptions::new())
            .unwrap();
        let stored = std::fs::read_to_string(dir.path().join("primary/slot")).unwrap();
        assert_eq!(stored, r#"{"level":"","score":0}"#);
    }

    #[test]
    fn test_mismatched_or_empty_payload_returns_default() {
        let dir = TempDir::new().unwrap();
        let engine = engine_in(&dir);

        engine
            .save("slot", &"just text".to_string(), &SaveOptions::new())
            .unwrap();
        let loaded = engine
            .load("slot", progress(), &SaveOptions::new())
            .unwrap();
        assert_eq!(loaded, progress());

        std::fs::write(dir.path().join("primary/empty"), "").unwrap();
        let loaded = engine
            .load("empty", progress(), &SaveOptions::new())
            .unwrap();
        assert_eq!(loaded, progress());
    }

    #[test]
    fn test_malformed_payload_is_a_load_failure() {
        let dir = TempDir::new().unwrap();
        let engine = engine_in(&dir);
        std::fs::create_dir_all(dir.path().join("primary")).unwrap();
        std::fs::write(dir.path().join("primary/slot"), "{not json").unwrap();

        let err = engine
            .load("slot", progress(), &SaveOptions::new())
            .unwrap_err();
        assert!(matches!(err, SaveError::LoadFailed { .. }));
        assert!(!err.is_decode_failure());
    }

    #[test]
    fn test_encrypted_file_with_utf16_encoding() {
        let dir = TempDir::new().unwrap();
        let engine = engine_in(&dir);
        let options = SaveOptions::new()
            .with_encrypt(true)
            .with_password("p1")
            .with_encoding(TextEncoding::Utf16Le);

        engine.save("slot", &progress(), &options).unwrap();
        let raw = std::fs::read(dir.path().join("primary/slot")).unwrap();
        assert_eq!(raw.len() % 2, 0);
        assert_eq!(raw[1], 0);

        let loaded = engine.load("slot", Progress::default(), &options).unwrap();
        assert_eq!(loaded, progress());
    }

    #[test]
    fn test_gzip_codec_writes_compressed_file() {
        let dir = TempDir::new().unwrap();
        let engine = engine_in(&dir).with_codec(Arc::new(GzipJsonCodec::new()));

        engine.save("slot", &progress(), &SaveOptions::new()).unwrap();
        let raw = std::fs::read(dir.path().join("primary/slot")).unwrap();
        assert_eq!(&raw[..2], &[0x1f, 0x8b]);

        let loaded = engine
            .load("slot", Progress::default(), &SaveOptions::new())
            .unwrap();
        assert_eq!(loaded, progress());
    }

    #[test]
    fn test_key_value_mode_stores_text_under_resolved_path() {
        let dir = TempDir::new().unwrap();
        let engine = kv_engine(&dir);

        engine
            .save("profile/slot1", &progress(), &SaveOptions::new())
            .unwrap();
        assert!(engine.exists("profile/slot1", None).unwrap());
        assert!(!dir.path().join("primary").exists());

        let key = dir.path().join("primary/profile/slot1");
        let stored = engine
            .key_value_store()
            .get(&key.to_string_lossy())
            .unwrap();
        assert_eq!(stored.as_deref(), Some(r#"{"level":"forest","score":42}"#));

        let loaded = engine
            .load("profile/slot1", Progress::default(), &SaveOptions::new())
            .unwrap();
        assert_eq!(loaded, progress());

        assert!(engine.list_files(None, None).unwrap().is_empty());
        assert!(engine.list_directories(None, None).unwrap().is_empty());

        engine.delete("profile/slot1", None).unwrap();
        assert!(!engine.exists("profile/slot1", None).unwrap());
    }

    #[test]
    fn test_key_value_mode_encrypted_and_utf16() {
        let dir = TempDir::new().unwrap();
        let engine = kv_engine(&dir);

        let encrypted = SaveOptions::new().with_encrypt(true).with_password("p1");
        engine.save("secret", &progress(), &encrypted).unwrap();
        let wrong = SaveOptions::new().with_encrypt(true).with_password("p2");
        assert!(engine
            .load("secret", Progress::default(), &wrong)
            .unwrap_err()
            .is_decode_failure());
        assert_eq!(
            engine.load("secret", Progress::default(), &encrypted).unwrap(),
            progress()
        );

        let utf16 = SaveOptions::new().with_encoding(TextEncoding::Utf16Le);
        engine.save("wide", &progress(), &utf16).unwrap();
        assert_eq!(
            engine.load("wide", Progress::default(), &utf16).unwrap(),
            progress()
        );
    }

    #[test]
    fn test_key_value_clear_wipes_store() {
        let dir = TempDir::new().unwrap();
        let engine = kv_engine(&dir);

        engine.save("a", &1u32, &SaveOptions::new()).unwrap();
        engine.save("Player.log", &2u32, &SaveOptions::new()).unwrap();
        engine
            .save("b", &3u32, &SaveOptions::at(BaseLocation::SecondaryStorage))
            .unwrap();

        assert_eq!(engine.clear(None).unwrap(), 3);
        assert!(engine.key_value_store().is_empty());
    }

    #[test]
    fn test_key_value_store_persists_to_file() {
        let dir = TempDir::new().unwrap();
        let store_path = dir.path().join("store.json");
        let settings = SaveSettings {
            use_key_value_store: true,
            key_value_store_path: Some(store_path.clone()),
            ..SaveSettings::with_root(dir.path())
        };

        SaveEngine::new(settings.clone())
            .unwrap()
            .save("slot", &progress(), &SaveOptions::new())
            .unwrap();
        assert!(store_path.exists());

        let reopened = SaveEngine::new(settings).unwrap();
        assert_eq!(
            reopened
                .load("slot", Progress::default(), &SaveOptions::new())
                .unwrap(),
            progress()
        );
    }

    #[test]
    fn test_failed_key_value_save_is_not_visible() {
        let dir = TempDir::new().unwrap();
        let store_dir = dir.path().join("store");
        let settings = SaveSettings {
            use_key_value_store: true,
            key_value_store_path: Some(store_dir.join("store.json")),
            ..SaveSettings::with_root(dir.path())
        };
        let engine = SaveEngine::new(settings).unwrap();
        engine.save("kept", &1u32, &SaveOptions::new()).unwrap();

        std::fs::remove_dir_all(&store_dir).unwrap();
        std::fs::write(&store_dir, "not a directory").unwrap();

        let err = engine.save("slot", &7u32, &SaveOptions::new()).unwrap_err();
        assert!(matches!(err, SaveError::SaveFailed { .. }));
        assert!(!engine.exists("slot", None).unwrap());
        assert_eq!(engine.load("slot", 0u32, &SaveOptions::new()).unwrap(), 0);

        assert!(engine.clear(None).is_err());
        assert_eq!(engine.load("kept", 0u32, &SaveOptions::new()).unwrap(), 1);
    }

    #[test]
    fn test_delete_skips_ignored_names() {
        let dir = TempDir::new().unwrap();
        let engine = engine_in(&dir);

        engine.save("Player.log", &1u32, &SaveOptions::new()).unwrap();
        assert!(!engine.delete("Player.log", None).unwrap());
        assert!(engine.exists("Player.log", None).unwrap());

        engine.save("Analytics/events", &1u32, &SaveOptions::new()).unwrap();
        assert!(!engine.delete("Analytics", None).unwrap());
        assert!(engine.exists("Analytics/events", None).unwrap());

        // Missing records are a no-op
        assert!(!engine.delete("never-saved", None).unwrap());

        engine.save("slot", &1u32, &SaveOptions::new()).unwrap();
        assert!(engine.delete("slot", None).unwrap());
    }

    #[test]
    fn test_delete_removes_directory_recursively() {
        let dir = TempDir::new().unwrap();
        let engine = engine_in(&dir);

        engine.save("profile/slot1", &1u32, &SaveOptions::new()).unwrap();
        engine.save("profile/slot2", &2u32, &SaveOptions::new()).unwrap();
        assert!(engine.exists("profile", None).unwrap());

        engine.delete("profile", None).unwrap();
        assert!(!engine.exists("profile/slot1", None).unwrap());
        assert!(!engine.exists("profile", None).unwrap());
    }

    #[test]
    fn test_structured_convention() {
        let dir = TempDir::new().unwrap();
        let settings = SaveSettings {
            path_convention: PathConvention::Structured,
            relative_path: "/Games/".to_string(),
            file_extension: ".json".to_string(),
            ..SaveSettings::with_root(dir.path())
        };
        let engine = SaveEngine::new(settings).unwrap();

        engine.save("slot1", &progress(), &SaveOptions::new()).unwrap();
        engine
            .save("profiles/alice", &progress(), &SaveOptions::new())
            .unwrap();
        assert!(dir.path().join("primary/Games/slot1.json").is_file());
        assert!(dir.path().join("primary/Games/profiles/alice.json").is_file());

        let files = engine.list_files(None, None).unwrap();
        assert_eq!(files, vec![dir.path().join("primary/Games/slot1.json")]);
        let dirs = engine.list_directories(None, None).unwrap();
        assert_eq!(dirs, vec![dir.path().join("primary/Games/profiles")]);

        // Identifiers name records only, never the directory beside them
        assert!(!engine.exists("profiles", None).unwrap());
        engine.delete("profiles", None).unwrap();
        assert!(engine.exists("profiles/alice", None).unwrap());
    }

    #[test]
    fn test_structured_delete_then_exists_agrees_with_load() {
        let dir = TempDir::new().unwrap();
        let settings = SaveSettings {
            path_convention: PathConvention::Structured,
            ..SaveSettings::with_root(dir.path())
        };
        let engine = SaveEngine::new(settings).unwrap();

        engine.save("profile", &1u32, &SaveOptions::new()).unwrap();
        engine.save("profile/slot1", &2u32, &SaveOptions::new()).unwrap();
        assert!(dir.path().join("primary/Saves/profile").is_dir());

        engine.delete("profile", None).unwrap();
        assert!(!engine.exists("profile", None).unwrap());
        assert_eq!(engine.load("profile", 0u32, &SaveOptions::new()).unwrap(), 0);

        assert!(engine.exists("profile/slot1", None).unwrap());
        assert_eq!(
            engine.load("profile/slot1", 0u32, &SaveOptions::new()).unwrap(),
            2
        );
    }

    #[test]
    fn test_listing_subpaths_and_locations() {
        let dir = TempDir::new().unwrap();
        let engine = engine_in(&dir);

        engine.save("profile/slot1", &1u32, &SaveOptions::new()).unwrap();
        engine.save("profile/slot2", &2u32, &SaveOptions::new()).unwrap();
        engine.save("profile/Player.log", &3u32, &SaveOptions::new()).unwrap();
        engine
            .save("elsewhere", &4u32, &SaveOptions::at(BaseLocation::SecondaryStorage))
            .unwrap();

        let files = engine.list_files(Some("profile"), None).unwrap();
        assert_eq!(
            files,
            vec![
                dir.path().join("primary/profile/slot1"),
                dir.path().join("primary/profile/slot2"),
            ]
        );

        let secondary = engine
            .list_files(None, Some(BaseLocation::SecondaryStorage))
            .unwrap();
        assert_eq!(secondary, vec![dir.path().join("secondary/elsewhere")]);

        assert!(engine.list_files(Some("missing"), None).unwrap().is_empty());
    }

    #[test]
    fn test_concrete_path_identifier_is_used_verbatim() {
        let dir = TempDir::new().unwrap();
        let engine = engine_in(&dir);
        let target = dir.path().join("outside/record.json");
        let identifier = target.to_string_lossy().into_owned();

        engine.save(&identifier, &progress(), &SaveOptions::new()).unwrap();
        assert!(target.is_file());
        assert!(!dir.path().join("primary").exists());
        assert_eq!(
            engine
                .load(&identifier, Progress::default(), &SaveOptions::new())
                .unwrap(),
            progress()
        );
    }

    #[test]
    fn test_failures_are_logged_when_enabled() {
        let dir = TempDir::new().unwrap();
        let settings = SaveSettings {
            log_errors: true,
            ..SaveSettings::with_root(dir.path())
        };
        let engine = SaveEngine::new(settings)
            .unwrap()
            .with_codec(Arc::new(BrokenCodec));

        let err = engine
            .save("slot", &progress(), &SaveOptions::new())
            .unwrap_err();
        assert_eq!(err.identifier(), Some("slot"));
    }

    #[test]
    fn test_settings_pick_codec_and_cipher() {
        let dir = TempDir::new().unwrap();
        let settings = SaveSettings {
            codec: "gzip".to_string(),
            default_password: Some("configured".to_string()),
            encrypt_by_default: true,
            ..SaveSettings::with_root(dir.path())
        };
        let engine = SaveEngine::new(settings).unwrap();
        assert_eq!(engine.defaults().codec.name(), "gzip-json");
        assert_eq!(engine.defaults().password, "configured");

        engine.save("slot", &progress(), &SaveOptions::new()).unwrap();
        let plain = SaveOptions::new().with_encrypt(false);
        assert!(engine.load("slot", Progress::default(), &plain).is_err());
        assert_eq!(
            engine
                .load("slot", Progress::default(), &SaveOptions::new())
                .unwrap(),
            progress()
        );
    }

    #[cfg(feature = "async-rt")]
    #[tokio::test]
    async fn test_async_save_load_keep_hook_order() {
        let dir = TempDir::new().unwrap();
        let engine = Arc::new(engine_in(&dir));
        let stages = record_stages(&engine);

        Arc::clone(&engine)
            .save_async("slot", progress(), SaveOptions::new())
            .await
            .unwrap();
        let loaded = Arc::clone(&engine)
            .load_async("slot", Progress::default(), SaveOptions::new())
            .await
            .unwrap();
        assert_eq!(loaded, progress());

        assert_eq!(
            *stages.lock().unwrap(),
            vec![
                LifecycleStage::BeforeSave,
                LifecycleStage::SaveCallback,
                LifecycleStage::AfterSave,
                LifecycleStage::BeforeLoad,
                LifecycleStage::LoadCallback,
                LifecycleStage::AfterLoad,
            ]
        );
    }

    #[cfg(feature = "async-rt")]
    #[tokio::test]
    async fn test_async_hook_panic_is_a_task_failure() {
        let dir = TempDir::new().unwrap();
        let engine = Arc::new(engine_in(&dir));
        engine.lifecycle().on_saving(|_| panic!("hook exploded"));

        let err = Arc::clone(&engine)
            .save_async("slot", progress(), SaveOptions::new())
            .await
            .unwrap_err();
        match err {
            SaveError::SaveFailed { source, .. } => {
                assert!(matches!(*source, SaveError::Task(_)))
            }
            other => panic!("expected SaveFailed, got {other:?}"),
        }
    }
}
