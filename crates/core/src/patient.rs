//! Patient service orchestration.
//!
//! Every operation follows the same spine: credential gate, then
//! fetch/decrypt, then the pure core function, then re-encrypt/persist.
//! The store handle is injected; the master key arrives per request and is
//! never cached or persisted. Read-then-write pairs carry no concurrency
//! token, so two writers to the same `pid_hash` race last-write-wins;
//! accepted at this request volume.

use std::sync::Arc;

use chrono::Utc;
use creel_store::DocumentStore;
use creel_types::{PatientRecord, TestRecord};
use serde_json::Value;

use crate::config::CoreConfig;
use crate::crypto::{decrypt_document, encrypt_document, MasterKey};
use crate::error::{CoreError, CoreResult};
use crate::gate::CredentialGate;
use crate::identity::{base_email_hash, derive_patient_id, ensure_pid_unique, pid_hash_for};
use crate::reconcile::match_incomplete_test;
use crate::sites;

/// Result of creating a patient: the stored plaintext record and whether
/// the derived id had to be suffixed to stay unique.
#[derive(Debug)]
pub struct AddOutcome {
    pub patient: PatientRecord,
    pub pid_altered: bool,
}

#[derive(Clone)]
pub struct PatientService {
    store: Arc<dyn DocumentStore>,
    gate: CredentialGate,
}

impl PatientService {
    pub fn new(cfg: &CoreConfig, store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            gate: CredentialGate::new(cfg.key_hash()),
        }
    }

    /// The validation gate, exposed directly for the `/validate` surface.
    pub fn validate_master_key(&self, key_data: &str) -> bool {
        self.gate.is_valid(key_data)
    }

    fn key_for(&self, key_data: &str) -> CoreResult<MasterKey> {
        self.gate.require(key_data)?;
        MasterKey::from_base64(key_data)
    }

    async fn fetch_decrypted(
        &self,
        pid_hash: &str,
        key: &MasterKey,
    ) -> CoreResult<PatientRecord> {
        let envelope = self
            .store
            .find_by_hash(pid_hash)
            .await?
            .ok_or(CoreError::PatientNotFound)?;
        let doc = decrypt_document(&envelope, key)?;
        Ok(serde_json::from_value(doc)?)
    }

    async fn persist_update(
        &self,
        pid_hash: &str,
        record: &PatientRecord,
        key: &MasterKey,
    ) -> CoreResult<()> {
        let doc = serde_json::to_value(record)?;
        let envelope = encrypt_document(&doc, key)?;
        if !self.store.update_by_hash(pid_hash, envelope).await? {
            // Record vanished between fetch and write.
            return Err(CoreError::PatientNotFound);
        }
        Ok(())
    }

    /// Create a patient: derive and uniquify the id, encrypt, persist.
    pub async fn add_patient(
        &self,
        mut record: PatientRecord,
        key_data: &str,
    ) -> CoreResult<AddOutcome> {
        let key = self.key_for(key_data)?;

        let site_code = sites::code_for(&record.fishery_name)
            .ok_or_else(|| CoreError::UnknownFishery(record.fishery_name.clone()))?;
        let base_pid = derive_patient_id(
            site_code,
            &record.last_name,
            &record.first_name,
            record.dob,
        )?;
        let (patient_id, pid_hash, pid_altered) =
            ensure_pid_unique(self.store.as_ref(), &base_pid).await?;

        record.fishery_id = Some(site_code.to_owned());
        record.patient_id = Some(patient_id);
        record.pid_hash = Some(pid_hash);
        record.base_email_hash = record.email_address.as_deref().map(base_email_hash);

        let doc = serde_json::to_value(&record)?;
        let envelope = encrypt_document(&doc, &key)?;
        self.store.insert(envelope).await?;

        tracing::info!(pid_altered, "patient record created");
        Ok(AddOutcome {
            patient: record,
            pid_altered,
        })
    }

    /// Fetch and decrypt one patient by id.
    pub async fn get_patient(
        &self,
        patient_id: &str,
        key_data: &str,
    ) -> CoreResult<PatientRecord> {
        let key = self.key_for(key_data)?;
        self.fetch_decrypted(&pid_hash_for(patient_id), &key).await
    }

    /// Fetch and decrypt the whole collection.
    pub async fn list_patients(&self, key_data: &str) -> CoreResult<Vec<PatientRecord>> {
        let key = self.key_for(key_data)?;
        let envelopes = self.store.find_all(None).await?;
        let mut patients = Vec::with_capacity(envelopes.len());
        for envelope in &envelopes {
            let doc = decrypt_document(envelope, &key)?;
            patients.push(serde_json::from_value(doc)?);
        }
        Ok(patients)
    }

    /// Replace a patient's fields with `updates`, keeping the stored
    /// identity (`patient_id`/`pid_hash`) so the lookup-key invariant
    /// cannot be broken by a caller.
    pub async fn update_patient(
        &self,
        patient_id: &str,
        mut updates: PatientRecord,
        key_data: &str,
    ) -> CoreResult<PatientRecord> {
        let key = self.key_for(key_data)?;
        let pid_hash = pid_hash_for(patient_id);
        let existing = self.fetch_decrypted(&pid_hash, &key).await?;

        updates.patient_id = existing.patient_id;
        updates.pid_hash = existing.pid_hash;
        updates.fishery_id = Some(
            sites::code_for(&updates.fishery_name)
                .ok_or_else(|| CoreError::UnknownFishery(updates.fishery_name.clone()))?
                .to_owned(),
        );
        updates.base_email_hash = updates.email_address.as_deref().map(base_email_hash);

        self.persist_update(&pid_hash, &updates, &key).await?;
        Ok(updates)
    }

    /// Reconcile an incoming completed result against the patient's
    /// incomplete tests and merge it onto the matched placeholder.
    pub async fn insert_test_result(
        &self,
        patient_id: &str,
        incoming: TestRecord,
        key_data: &str,
    ) -> CoreResult<TestRecord> {
        let key = self.key_for(key_data)?;

        let test_id = incoming
            .test_id
            .clone()
            .ok_or_else(|| CoreError::InvalidInput("result upload has no test_id".into()))?;
        let performed_at = incoming.test_performed_datetime.ok_or_else(|| {
            CoreError::InvalidInput("result upload has no test_performed_datetime".into())
        })?;

        let pid_hash = pid_hash_for(patient_id);
        let mut patient = self.fetch_decrypted(&pid_hash, &key).await?;

        // Duplicate submissions leave the stored record untouched.
        if patient.has_test_id(&test_id) {
            return Err(CoreError::DuplicateTestId(test_id));
        }

        let incomplete = patient.incomplete_tests();
        if incomplete.is_empty() {
            return Err(CoreError::NoIncompleteTests);
        }

        let idx = match_incomplete_test(&incomplete, performed_at)
            .ok_or(CoreError::NoTemporalMatch)?;

        let target = &mut patient.test_results[idx];
        target.test_id = Some(test_id);
        target.test_performed_datetime = Some(performed_at);
        target.test_reported_datetime =
            Some(incoming.test_reported_datetime.unwrap_or_else(Utc::now));
        target.result = incoming.result;
        let merged = target.clone();

        self.persist_update(&pid_hash, &patient, &key).await?;
        tracing::info!(test_index = idx, "test result reconciled");
        Ok(merged)
    }

    /// Patch individual fields of an already-completed test, addressed by
    /// its external `test_id`.
    pub async fn update_test_result(
        &self,
        patient_id: &str,
        test_id: &str,
        updates: &Value,
        key_data: &str,
    ) -> CoreResult<TestRecord> {
        let key = self.key_for(key_data)?;
        if test_id.trim().is_empty() {
            return Err(CoreError::InvalidInput(
                "submitted test has no test_id".into(),
            ));
        }
        let Value::Object(update_fields) = updates else {
            return Err(CoreError::InvalidInput(
                "test updates must be a JSON object".into(),
            ));
        };

        let pid_hash = pid_hash_for(patient_id);
        let patient = self.fetch_decrypted(&pid_hash, &key).await?;

        // Merge at the document level so partial updates touch only the
        // supplied keys, then re-type the whole record to keep it honest.
        let mut doc = serde_json::to_value(&patient)?;
        let tests = doc["test_results"]
            .as_array_mut()
            .ok_or_else(|| CoreError::TestNotFound(test_id.to_owned()))?;
        let idx = tests
            .iter()
            .position(|t| t.get("test_id").and_then(Value::as_str) == Some(test_id))
            .ok_or_else(|| CoreError::TestNotFound(test_id.to_owned()))?;
        // A rename is allowed, but it must not collide with another test
        // on the same record.
        if let Some(new_id) = update_fields.get("test_id").and_then(Value::as_str) {
            if new_id != test_id
                && tests.iter().enumerate().any(|(i, t)| {
                    i != idx && t.get("test_id").and_then(Value::as_str) == Some(new_id)
                })
            {
                return Err(CoreError::DuplicateTestId(new_id.to_owned()));
            }
        }
        let Value::Object(target_fields) = &mut tests[idx] else {
            return Err(CoreError::TestNotFound(test_id.to_owned()));
        };
        for (k, v) in update_fields {
            target_fields.insert(k.clone(), v.clone());
        }

        let updated: PatientRecord = serde_json::from_value(doc)?;
        let merged = updated
            .test_results
            .get(idx)
            .cloned()
            .ok_or_else(|| CoreError::TestNotFound(test_id.to_owned()))?;

        self.persist_update(&pid_hash, &updated, &key).await?;
        Ok(merged)
    }

    /// Remove a patient record entirely.
    pub async fn delete_patient(&self, patient_id: &str, key_data: &str) -> CoreResult<()> {
        self.gate.require(key_data)?;
        if !self
            .store
            .delete_by_hash(&pid_hash_for(patient_id))
            .await?
        {
            return Err(CoreError::PatientNotFound);
        }
        Ok(())
    }

    /// Run a top-level equality query over the collection, optionally
    /// decrypting the hits. Only allow-listed fields are useful filter
    /// keys, since everything else is ciphertext at rest.
    pub async fn query_patients(
        &self,
        filter: &Value,
        decrypt: bool,
        key_data: &str,
    ) -> CoreResult<Vec<Value>> {
        let key = self.key_for(key_data)?;
        if !filter.is_object() {
            return Err(CoreError::InvalidInput(
                "query filter must be a JSON object".into(),
            ));
        }
        let envelopes = self.store.find_all(Some(filter)).await?;
        if !decrypt {
            return Ok(envelopes);
        }
        let mut out = Vec::with_capacity(envelopes.len());
        for envelope in &envelopes {
            out.push(decrypt_document(envelope, &key)?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::hash_string;
    use base64::{engine::general_purpose, Engine as _};
    use chrono::{Duration, NaiveDate, TimeZone};
    use creel_store::MemoryStore;
    use creel_types::{Address, TestResult};
    use serde_json::json;

    fn master_key_string() -> String {
        general_purpose::STANDARD.encode([7u8; 32])
    }

    fn service() -> PatientService {
        let cfg = CoreConfig::new(hash_string(&master_key_string()), false).unwrap();
        PatientService::new(&cfg, Arc::new(MemoryStore::new()))
    }

    fn collection_time() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2021, 6, 1, 9, 0, 0).unwrap()
    }

    fn sample_patient() -> PatientRecord {
        PatientRecord {
            last_name: "Anderson".into(),
            first_name: "Briana".into(),
            ssn: Some("123-45-6789".into()),
            dob: NaiveDate::from_ymd_opt(1990, 1, 1).unwrap(),
            gender: Some("F".into()),
            race_ethnicity: None,
            hispanic: "N".into(),
            home_phone: None,
            cell_phone: Some("907-555-0101".into()),
            local_phone: None,
            physical_address: Some(Address {
                street: Some("14 Harbor Rd".into()),
                city: Some("Naknek".into()),
                state: Some("AK".into()),
                zip: Some("99633".into()),
            }),
            email_address: Some("briana@example.com".into()),
            base_email_hash: None,
            insurance: "Y".into(),
            been_here_before: "N".into(),
            fishery_name: "Silver Bay".into(),
            fishery_id: None,
            test_results: vec![TestRecord::from_lab_slip(collection_time())],
            patient_id: None,
            pid_hash: None,
        }
    }

    fn result_upload(performed: chrono::DateTime<Utc>) -> TestRecord {
        TestRecord {
            specimen_type: "NP-Nasopharyngeal swab".into(),
            lab_slip_collection_datetime: None,
            test_id: Some("CUE-0001".into()),
            test_performed_datetime: Some(performed),
            test_reported_datetime: None,
            result: Some(TestResult::Negative),
        }
    }

    #[tokio::test]
    async fn add_then_get_round_trips_exactly() {
        let svc = service();
        let key = master_key_string();

        let outcome = svc.add_patient(sample_patient(), &key).await.unwrap();
        assert_eq!(outcome.patient.patient_id.as_deref(), Some("33AB010190"));
        assert!(!outcome.pid_altered);

        let fetched = svc.get_patient("33AB010190", &key).await.unwrap();
        assert_eq!(fetched, outcome.patient);
        // Searchable email hash was populated.
        assert_eq!(
            fetched.base_email_hash.as_deref(),
            Some(base_email_hash("briana@example.com").as_str())
        );
    }

    #[tokio::test]
    async fn stored_envelope_is_encrypted_with_plaintext_search_keys() {
        let store = Arc::new(MemoryStore::new());
        let cfg = CoreConfig::new(hash_string(&master_key_string()), false).unwrap();
        let svc = PatientService::new(&cfg, store.clone());
        let key = master_key_string();

        let outcome = svc.add_patient(sample_patient(), &key).await.unwrap();
        let pid_hash = outcome.patient.pid_hash.clone().unwrap();

        let envelope = store.find_by_hash(&pid_hash).await.unwrap().unwrap();
        assert_eq!(envelope["pid_hash"], json!(pid_hash));
        assert_eq!(envelope["fishery_id"], json!("33"));
        assert_eq!(envelope["fishery_name"], json!("Silver Bay"));
        assert!(envelope["last_name"]
            .as_str()
            .unwrap()
            .starts_with("enc1:"));
        assert!(envelope["dob"].as_str().unwrap().starts_with("enc1:"));
    }

    #[tokio::test]
    async fn same_derivation_twice_gets_a_suffix() {
        let svc = service();
        let key = master_key_string();

        let first = svc.add_patient(sample_patient(), &key).await.unwrap();
        assert_eq!(first.patient.patient_id.as_deref(), Some("33AB010190"));
        assert!(!first.pid_altered);

        let second = svc.add_patient(sample_patient(), &key).await.unwrap();
        assert_eq!(second.patient.patient_id.as_deref(), Some("33AB010190_1"));
        assert!(second.pid_altered);
    }

    #[tokio::test]
    async fn every_operation_rejects_a_bad_key_uniformly() {
        let svc = service();
        let good = master_key_string();
        svc.add_patient(sample_patient(), &good).await.unwrap();

        let bad = "not-the-key";
        assert!(!svc.validate_master_key(bad));
        for err in [
            svc.add_patient(sample_patient(), bad).await.unwrap_err(),
            svc.get_patient("33AB010190", bad).await.unwrap_err(),
            svc.list_patients(bad).await.map(|_| ()).unwrap_err(),
            svc.delete_patient("33AB010190", bad).await.unwrap_err(),
            svc.insert_test_result("33AB010190", result_upload(collection_time()), bad)
                .await
                .map(|_| ())
                .unwrap_err(),
        ] {
            assert!(matches!(err, CoreError::InvalidCredential));
        }
    }

    #[tokio::test]
    async fn unknown_fishery_is_rejected() {
        let svc = service();
        let mut patient = sample_patient();
        patient.fishery_name = "Atlantis".into();
        let err = svc
            .add_patient(patient, &master_key_string())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::UnknownFishery(_)));
    }

    #[tokio::test]
    async fn result_upload_completes_the_matching_slip() {
        let svc = service();
        let key = master_key_string();
        svc.add_patient(sample_patient(), &key).await.unwrap();

        let performed = collection_time() + Duration::days(1);
        let merged = svc
            .insert_test_result("33AB010190", result_upload(performed), &key)
            .await
            .unwrap();

        assert_eq!(merged.test_id.as_deref(), Some("CUE-0001"));
        assert_eq!(merged.result, Some(TestResult::Negative));
        // Slip fields retained through the merge.
        assert_eq!(merged.lab_slip_collection_datetime, Some(collection_time()));
        assert_eq!(merged.specimen_type, "NP-Nasopharyngeal swab");
        // Reported time defaulted.
        assert!(merged.test_reported_datetime.is_some());

        let fetched = svc.get_patient("33ab010190", &key).await.unwrap();
        assert!(!fetched.test_results[0].is_incomplete());
    }

    #[tokio::test]
    async fn duplicate_test_id_leaves_record_untouched() {
        let svc = service();
        let key = master_key_string();
        let mut patient = sample_patient();
        patient
            .test_results
            .push(TestRecord::from_lab_slip(collection_time() + Duration::days(2)));
        svc.add_patient(patient, &key).await.unwrap();

        let performed = collection_time() + Duration::days(1);
        svc.insert_test_result("33AB010190", result_upload(performed), &key)
            .await
            .unwrap();
        let before = svc.get_patient("33AB010190", &key).await.unwrap();

        let err = svc
            .insert_test_result("33AB010190", result_upload(performed), &key)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::DuplicateTestId(_)));

        let after = svc.get_patient("33AB010190", &key).await.unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn missing_slips_and_missed_windows_are_distinct_errors() {
        let svc = service();
        let key = master_key_string();

        // Patient whose only test is already complete.
        let mut completed = sample_patient();
        completed.test_results[0].test_id = Some("DONE-1".into());
        svc.add_patient(completed, &key).await.unwrap();

        let err = svc
            .insert_test_result(
                "33AB010190",
                result_upload(collection_time() + Duration::days(1)),
                &key,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NoIncompleteTests));

        // Second patient (suffix _1) has a slip, but the result is four
        // days before collection: outside the tolerance window.
        svc.add_patient(sample_patient(), &key).await.unwrap();
        let err = svc
            .insert_test_result(
                "33AB010190_1",
                result_upload(collection_time() - Duration::days(4)),
                &key,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NoTemporalMatch));
    }

    #[tokio::test]
    async fn update_test_result_patches_named_fields_only() {
        let svc = service();
        let key = master_key_string();
        svc.add_patient(sample_patient(), &key).await.unwrap();
        svc.insert_test_result(
            "33AB010190",
            result_upload(collection_time() + Duration::days(1)),
            &key,
        )
        .await
        .unwrap();

        let merged = svc
            .update_test_result(
                "33AB010190",
                "CUE-0001",
                &json!({"result": "POSITIVE"}),
                &key,
            )
            .await
            .unwrap();
        assert_eq!(merged.result, Some(TestResult::Positive));
        assert_eq!(merged.specimen_type, "NP-Nasopharyngeal swab");

        let err = svc
            .update_test_result("33AB010190", "NOPE", &json!({"result": "POSITIVE"}), &key)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::TestNotFound(_)));
    }

    #[tokio::test]
    async fn update_test_result_can_correct_the_test_id() {
        let svc = service();
        let key = master_key_string();
        svc.add_patient(sample_patient(), &key).await.unwrap();
        svc.insert_test_result(
            "33AB010190",
            result_upload(collection_time() + Duration::days(1)),
            &key,
        )
        .await
        .unwrap();

        // A mistyped id at upload time gets corrected in place.
        let merged = svc
            .update_test_result(
                "33AB010190",
                "CUE-0001",
                &json!({"test_id": "CUE-0002"}),
                &key,
            )
            .await
            .unwrap();
        assert_eq!(merged.test_id.as_deref(), Some("CUE-0002"));
        assert_eq!(merged.result, Some(TestResult::Negative));

        let fetched = svc.get_patient("33AB010190", &key).await.unwrap();
        assert_eq!(fetched.test_results[0].test_id.as_deref(), Some("CUE-0002"));
        assert!(matches!(
            svc.update_test_result("33AB010190", "CUE-0001", &json!({}), &key)
                .await
                .unwrap_err(),
            CoreError::TestNotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_id_rename_cannot_collide_with_a_sibling() {
        let svc = service();
        let key = master_key_string();
        let mut patient = sample_patient();
        patient
            .test_results
            .push(TestRecord::from_lab_slip(collection_time() + Duration::days(2)));
        svc.add_patient(patient, &key).await.unwrap();

        svc.insert_test_result(
            "33AB010190",
            result_upload(collection_time() + Duration::days(1)),
            &key,
        )
        .await
        .unwrap();
        let mut second = result_upload(collection_time() + Duration::days(2));
        second.test_id = Some("CUE-0002".into());
        svc.insert_test_result("33AB010190", second, &key)
            .await
            .unwrap();

        let err = svc
            .update_test_result(
                "33AB010190",
                "CUE-0001",
                &json!({"test_id": "CUE-0002"}),
                &key,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::DuplicateTestId(_)));

        // Neither test moved.
        let fetched = svc.get_patient("33AB010190", &key).await.unwrap();
        let ids: Vec<_> = fetched
            .test_results
            .iter()
            .filter_map(|t| t.test_id.as_deref())
            .collect();
        assert_eq!(ids, ["CUE-0001", "CUE-0002"]);
    }

    #[tokio::test]
    async fn update_patient_preserves_identity_fields() {
        let svc = service();
        let key = master_key_string();
        let outcome = svc.add_patient(sample_patient(), &key).await.unwrap();

        let mut updates = sample_patient();
        updates.cell_phone = Some("907-555-0202".into());
        // A caller trying to move the record cannot.
        updates.patient_id = Some("99XX000000".into());
        updates.pid_hash = Some("feedface".into());

        let updated = svc.update_patient("33AB010190", updates, &key).await.unwrap();
        assert_eq!(updated.cell_phone.as_deref(), Some("907-555-0202"));
        assert_eq!(updated.patient_id, outcome.patient.patient_id);
        assert_eq!(updated.pid_hash, outcome.patient.pid_hash);
        // Search keys re-derived, not caller-supplied.
        assert_eq!(updated.fishery_id.as_deref(), Some("33"));
    }

    #[tokio::test]
    async fn delete_then_get_reports_not_found() {
        let svc = service();
        let key = master_key_string();
        svc.add_patient(sample_patient(), &key).await.unwrap();

        svc.delete_patient("33AB010190", &key).await.unwrap();
        assert!(matches!(
            svc.get_patient("33AB010190", &key).await.unwrap_err(),
            CoreError::PatientNotFound
        ));
        assert!(matches!(
            svc.delete_patient("33AB010190", &key).await.unwrap_err(),
            CoreError::PatientNotFound
        ));
    }

    #[tokio::test]
    async fn query_filters_on_plaintext_keys() {
        let svc = service();
        let key = master_key_string();
        svc.add_patient(sample_patient(), &key).await.unwrap();
        let mut other = sample_patient();
        other.fishery_name = "Copper River".into();
        other.last_name = "Lowe".into();
        svc.add_patient(other, &key).await.unwrap();

        let hits = svc
            .query_patients(&json!({"fishery_id": "07"}), false, &key)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        // Undecrypted hits stay ciphertext.
        assert!(hits[0]["last_name"].as_str().unwrap().starts_with("enc1:"));

        let hits = svc
            .query_patients(&json!({"fishery_id": "07"}), true, &key)
            .await
            .unwrap();
        assert_eq!(hits[0]["last_name"], json!("Lowe"));
    }

    #[tokio::test]
    async fn non_object_query_filter_is_rejected() {
        let svc = service();
        let key = master_key_string();
        svc.add_patient(sample_patient(), &key).await.unwrap();

        for filter in [json!("oops"), json!(42), json!(["fishery_id"]), json!(null)] {
            let err = svc
                .query_patients(&filter, false, &key)
                .await
                .unwrap_err();
            assert!(matches!(err, CoreError::InvalidInput(_)));
        }
    }
}
