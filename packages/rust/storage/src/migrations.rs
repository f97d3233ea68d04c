//! SQL migration definitions for the school records database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "School schema: courses, students, teachers, subjects, grades, calls, schedules, absences",
            sql: r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS especialidades (
    id          INTEGER PRIMARY KEY,
    nombre      TEXT NOT NULL,
    descripcion TEXT,
    activa      INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS turnos (
    id          INTEGER PRIMARY KEY,
    nombre      TEXT NOT NULL,
    hora_inicio TEXT,
    hora_fin    TEXT
);

CREATE TABLE IF NOT EXISTS cursos (
    id              INTEGER PRIMARY KEY,
    anio            INTEGER NOT NULL,
    division        TEXT NOT NULL,
    grado           TEXT,
    especialidad_id INTEGER REFERENCES especialidades(id),
    turno_id        INTEGER REFERENCES turnos(id),
    activo          INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS estudiantes (
    id                INTEGER PRIMARY KEY,
    dni               TEXT NOT NULL,
    nombre            TEXT NOT NULL,
    apellido          TEXT NOT NULL,
    fecha_nacimiento  TEXT,
    telefono_celular  TEXT,
    email             TEXT,
    curso_id          INTEGER REFERENCES cursos(id),
    activo            INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS materias (
    id              INTEGER PRIMARY KEY,
    nombre          TEXT NOT NULL,
    codigo          TEXT,
    horas_semanales INTEGER,
    especialidad_id INTEGER REFERENCES especialidades(id),
    activo          INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS profesores (
    id               INTEGER PRIMARY KEY,
    dni              TEXT NOT NULL,
    nombre           TEXT NOT NULL,
    apellido         TEXT NOT NULL,
    email            TEXT,
    telefono_celular TEXT,
    titulo           TEXT,
    fecha_ingreso    TEXT,
    activo           INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS profesor_materia (
    profesor_id INTEGER NOT NULL REFERENCES profesores(id) ON DELETE CASCADE,
    materia_id  INTEGER NOT NULL REFERENCES materias(id) ON DELETE CASCADE,
    PRIMARY KEY (profesor_id, materia_id)
);

CREATE TABLE IF NOT EXISTS notas (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    estudiante_id  INTEGER NOT NULL REFERENCES estudiantes(id) ON DELETE CASCADE,
    materia_id     INTEGER NOT NULL REFERENCES materias(id),
    nota           REAL NOT NULL,
    cuatrimestre   INTEGER NOT NULL,
    fecha_registro TEXT NOT NULL DEFAULT (date('now')),
    observaciones  TEXT
);

CREATE TABLE IF NOT EXISTS llamados_atencion (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    estudiante_id INTEGER NOT NULL REFERENCES estudiantes(id) ON DELETE CASCADE,
    fecha         TEXT NOT NULL,
    motivo        TEXT NOT NULL,
    sancion       TEXT,
    observaciones TEXT
);

CREATE TABLE IF NOT EXISTS horarios (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    curso_id    INTEGER NOT NULL REFERENCES cursos(id),
    materia_id  INTEGER NOT NULL REFERENCES materias(id),
    profesor_id INTEGER NOT NULL REFERENCES profesores(id),
    dia         TEXT NOT NULL,
    hora_inicio TEXT NOT NULL,
    hora_fin    TEXT NOT NULL,
    aula        TEXT
);

CREATE TABLE IF NOT EXISTS inasistencias (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    estudiante_id INTEGER NOT NULL REFERENCES estudiantes(id) ON DELETE CASCADE,
    fecha         TEXT NOT NULL,
    justificada   INTEGER NOT NULL DEFAULT 0
);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
        },
        Migration {
            version: 2,
            description: "Lookup indexes for per-student and per-course queries",
            sql: r#"
CREATE INDEX IF NOT EXISTS idx_estudiantes_curso ON estudiantes(curso_id);
CREATE INDEX IF NOT EXISTS idx_estudiantes_apellido ON estudiantes(apellido, nombre);
CREATE INDEX IF NOT EXISTS idx_notas_estudiante ON notas(estudiante_id);
CREATE INDEX IF NOT EXISTS idx_llamados_estudiante ON llamados_atencion(estudiante_id);
CREATE INDEX IF NOT EXISTS idx_inasistencias_estudiante ON inasistencias(estudiante_id);
CREATE INDEX IF NOT EXISTS idx_horarios_curso ON horarios(curso_id);

INSERT INTO schema_migrations (version) VALUES (2);
"#,
        },
    ]
}
