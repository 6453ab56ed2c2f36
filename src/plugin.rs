//! Registro de plugins en tiempo de compilación.
//!
//! En lugar de carga dinámica por nombre, cada plugin se registra
//! explícitamente al arranque con una factory. La activación valida que las
//! dependencias declaradas existan, ordena topológicamente (dependencias
//! primero) y desempata por prioridad descendente. Un plugin que falla se
//! salta con un warning; nunca tumba el sistema.

use anyhow::Result;
use std::collections::{HashMap, HashSet};
use tracing::{info, warn};

/// Comportamiento de un plugin. `load` corre una vez durante la activación.
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;
    fn load(&mut self) -> Result<()>;
    fn unload(&mut self) {}
}

type PluginFactory = Box<dyn Fn() -> Box<dyn Plugin> + Send + Sync>;

/// Registro declarado de un plugin, previo a su activación.
pub struct PluginRegistration {
    pub name: String,
    pub enabled: bool,
    /// Mayor prioridad se ejecuta antes, a igualdad de dependencias
    pub priority: i32,
    pub dependencies: Vec<String>,
    factory: PluginFactory,
}

pub struct PluginRegistry {
    registrations: Vec<PluginRegistration>,
    /// Plugins activos en orden de activación
    active: Vec<Box<dyn Plugin>>,
    failed: Vec<String>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self {
            registrations: Vec::new(),
            active: Vec::new(),
            failed: Vec::new(),
        }
    }

    pub fn register<F>(
        &mut self,
        name: impl Into<String>,
        priority: i32,
        dependencies: Vec<String>,
        factory: F,
    ) where
        F: Fn() -> Box<dyn Plugin> + Send + Sync + 'static,
    {
        self.registrations.push(PluginRegistration {
            name: name.into(),
            enabled: true,
            priority,
            dependencies,
            factory: Box::new(factory),
        });
    }

    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> bool {
        match self
            .registrations
            .iter_mut()
            .find(|reg| reg.name == name)
        {
            Some(reg) => {
                reg.enabled = enabled;
                true
            }
            None => false,
        }
    }

    /// Activa los plugins habilitados en orden topológico y devuelve
    /// cuántos quedaron activos.
    pub fn activate(&mut self) -> usize {
        let known: HashSet<&str> = self
            .registrations
            .iter()
            .filter(|reg| reg.enabled)
            .map(|reg| reg.name.as_str())
            .collect();

        // validar existencia de dependencias antes de ordenar
        let mut eligible: Vec<&PluginRegistration> = Vec::new();
        for reg in self.registrations.iter().filter(|reg| reg.enabled) {
            let missing: Vec<&String> = reg
                .dependencies
                .iter()
                .filter(|dep| !known.contains(dep.as_str()))
                .collect();
            if missing.is_empty() {
                eligible.push(reg);
            } else {
                warn!(
                    "🔌 Plugin '{}' saltado: dependencias inexistentes {:?}",
                    reg.name, missing
                );
                self.failed.push(reg.name.clone());
            }
        }

        for reg in Self::activation_order(&eligible) {
            let mut plugin = (reg.factory)();
            match plugin.load() {
                Ok(()) => {
                    info!("🔌 Plugin '{}' activado", reg.name);
                    self.active.push(plugin);
                }
                Err(e) => {
                    warn!("🔌 Plugin '{}' falló al cargar, saltado: {}", reg.name, e);
                    self.failed.push(reg.name.clone());
                }
            }
        }

        self.active.len()
    }

    /// Kahn sobre las dependencias declaradas; entre nodos listos gana la
    /// prioridad mayor (y el nombre como desempate estable).
    fn activation_order<'a>(
        eligible: &[&'a PluginRegistration],
    ) -> Vec<&'a PluginRegistration> {
        let by_name: HashMap<&str, &PluginRegistration> = eligible
            .iter()
            .map(|reg| (reg.name.as_str(), *reg))
            .collect();

        let mut pending: HashMap<&str, HashSet<&str>> = eligible
            .iter()
            .map(|reg| {
                let deps: HashSet<&str> = reg
                    .dependencies
                    .iter()
                    .map(String::as_str)
                    .filter(|dep| by_name.contains_key(dep))
                    .collect();
                (reg.name.as_str(), deps)
            })
            .collect();

        let mut ordered = Vec::with_capacity(eligible.len());
        while !pending.is_empty() {
            let mut ready: Vec<&str> = pending
                .iter()
                .filter(|(_, deps)| deps.is_empty())
                .map(|(name, _)| *name)
                .collect();
            if ready.is_empty() {
                // ciclo: lo que queda no puede activarse
                warn!(
                    "🔌 Ciclo de dependencias entre plugins: {:?}",
                    pending.keys().collect::<Vec<_>>()
                );
                break;
            }
            ready.sort_by(|a, b| {
                let pa = by_name[a].priority;
                let pb = by_name[b].priority;
                pb.cmp(&pa).then_with(|| a.cmp(b))
            });

            for name in ready {
                pending.remove(name);
                for deps in pending.values_mut() {
                    deps.remove(name);
                }
                ordered.push(by_name[name]);
            }
        }
        ordered
    }

    pub fn active_names(&self) -> Vec<&str> {
        self.active.iter().map(|plugin| plugin.name()).collect()
    }

    pub fn failed_names(&self) -> &[String] {
        &self.failed
    }

    pub fn deactivate_all(&mut self) {
        for plugin in self.active.iter_mut().rev() {
            plugin.unload();
        }
        self.active.clear();
    }

    /// Saludable si ningún plugin habilitado quedó fuera.
    pub fn is_healthy(&self) -> bool {
        self.failed.is_empty()
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}
