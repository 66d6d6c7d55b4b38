// In-memory tables shared by the store implementations.
//
// All relational guarantees (unique names, foreign keys, protected deletes)
// are enforced here so every store behaves the same.

use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::model::{Host, HostId, Record, RecordId, TargetId, UpdateTarget};

#[derive(Debug, Clone, Default)]
pub(crate) struct Tables {
    hosts: BTreeMap<HostId, Host>,
    targets: BTreeMap<TargetId, UpdateTarget>,
    records: BTreeMap<RecordId, Record>,
}

impl Tables {
    pub(crate) fn from_rows(hosts: Vec<Host>, targets: Vec<UpdateTarget>, records: Vec<Record>) -> Self {
        Self {
            hosts: hosts.into_iter().map(|h| (h.id, h)).collect(),
            targets: targets.into_iter().map(|t| (t.id, t)).collect(),
            records: records.into_iter().map(|r| (r.id, r)).collect(),
        }
    }

    pub(crate) fn host_rows(&self) -> Vec<Host> {
        self.hosts.values().cloned().collect()
    }

    pub(crate) fn target_rows(&self) -> Vec<UpdateTarget> {
        self.targets.values().cloned().collect()
    }

    pub(crate) fn record_rows(&self) -> Vec<Record> {
        self.records.values().cloned().collect()
    }

    // -- hosts --

    pub(crate) fn get_host(&self, id: HostId) -> Option<Host> {
        self.hosts.get(&id).cloned()
    }

    pub(crate) fn find_host(&self, fqdn: &str) -> Option<Host> {
        self.hosts.values().find(|h| h.fqdn == fqdn).cloned()
    }

    pub(crate) fn insert_host(&mut self, mut host: Host) -> Result<Host> {
        host.id = HostId(next_id(&self.hosts));
        self.check_host_fqdn(&host)?;
        self.hosts.insert(host.id, host.clone());
        Ok(host)
    }

    pub(crate) fn update_host(&mut self, host: &Host) -> Result<()> {
        if !self.hosts.contains_key(&host.id) {
            return Err(Error::not_found(format!("host {}", host.id)));
        }
        self.check_host_fqdn(host)?;
        self.hosts.insert(host.id, host.clone());
        Ok(())
    }

    pub(crate) fn delete_host(&mut self, id: HostId) -> Result<()> {
        if !self.hosts.contains_key(&id) {
            return Err(Error::not_found(format!("host {id}")));
        }
        if self.records.values().any(|r| r.host_id == id) {
            return Err(Error::constraint(format!(
                "host {id} is referenced by records and cannot be deleted"
            )));
        }
        self.hosts.remove(&id);
        Ok(())
    }

    fn check_host_fqdn(&self, host: &Host) -> Result<()> {
        let taken = self
            .hosts
            .values()
            .any(|other| other.id != host.id && other.fqdn == host.fqdn);
        if taken {
            return Err(Error::constraint(format!(
                "host with fqdn '{}' already exists",
                host.fqdn
            )));
        }
        Ok(())
    }

    // -- targets --

    pub(crate) fn get_target(&self, id: TargetId) -> Option<UpdateTarget> {
        self.targets.get(&id).cloned()
    }

    pub(crate) fn insert_target(&mut self, mut target: UpdateTarget) -> Result<UpdateTarget> {
        target.id = TargetId(next_id(&self.targets));
        self.check_target_name(&target)?;
        self.targets.insert(target.id, target.clone());
        Ok(target)
    }

    pub(crate) fn update_target(&mut self, target: &UpdateTarget) -> Result<()> {
        if !self.targets.contains_key(&target.id) {
            return Err(Error::not_found(format!("update target {}", target.id)));
        }
        self.check_target_name(target)?;
        self.targets.insert(target.id, target.clone());
        Ok(())
    }

    pub(crate) fn delete_target(&mut self, id: TargetId) -> Result<()> {
        if !self.targets.contains_key(&id) {
            return Err(Error::not_found(format!("update target {id}")));
        }
        if self.records.values().any(|r| r.target_id == id) {
            return Err(Error::constraint(format!(
                "update target {id} is referenced by records and cannot be deleted"
            )));
        }
        self.targets.remove(&id);
        Ok(())
    }

    fn check_target_name(&self, target: &UpdateTarget) -> Result<()> {
        let taken = self
            .targets
            .values()
            .any(|other| other.id != target.id && other.name == target.name);
        if taken {
            return Err(Error::constraint(format!(
                "update target named '{}' already exists",
                target.name
            )));
        }
        Ok(())
    }

    // -- records --

    pub(crate) fn get_record(&self, id: RecordId) -> Option<Record> {
        self.records.get(&id).cloned()
    }

    pub(crate) fn records_for_host(&self, host_id: HostId) -> Vec<Record> {
        let mut records: Vec<Record> = self
            .records
            .values()
            .filter(|r| r.host_id == host_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| a.fqdn.cmp(&b.fqdn));
        records
    }

    pub(crate) fn insert_record(&mut self, mut record: Record) -> Result<Record> {
        record.id = RecordId(next_id(&self.records));
        self.check_record(&record)?;
        self.records.insert(record.id, record.clone());
        Ok(record)
    }

    pub(crate) fn update_record(&mut self, record: &Record) -> Result<()> {
        if !self.records.contains_key(&record.id) {
            return Err(Error::not_found(format!("record {}", record.id)));
        }
        self.check_record(record)?;
        self.records.insert(record.id, record.clone());
        Ok(())
    }

    pub(crate) fn delete_record(&mut self, id: RecordId) -> Result<()> {
        self.records
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| Error::not_found(format!("record {id}")))
    }

    fn check_record(&self, record: &Record) -> Result<()> {
        if !self.hosts.contains_key(&record.host_id) {
            return Err(Error::constraint(format!(
                "record references unknown host {}",
                record.host_id
            )));
        }
        if !self.targets.contains_key(&record.target_id) {
            return Err(Error::constraint(format!(
                "record references unknown update target {}",
                record.target_id
            )));
        }
        let taken = self.records.values().any(|other| {
            other.id != record.id && other.host_id == record.host_id && other.fqdn == record.fqdn
        });
        if taken {
            return Err(Error::constraint(format!(
                "host {} already has a record '{}'",
                record.host_id, record.fqdn
            )));
        }
        Ok(())
    }
}

fn next_id<K, V>(table: &BTreeMap<K, V>) -> u64
where
    K: Copy + Into<u64>,
{
    table
        .keys()
        .next_back()
        .map_or(1, |&last| last.into() + 1)
}
